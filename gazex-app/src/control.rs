//! Line-oriented control channel. Each line is either a command token or a calibration
//! as a JSON object. A reader thread publishes what it parses onto the session bus.

use std::io::{self, BufRead};
use std::thread::{self, JoinHandle};

use gazex_core::{Command, EventBus};
use gazex_eye::CalibrationParameters;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    Command(Command),
    Calibration(CalibrationParameters),
}

/// Unrecognized lines yield `None`.
pub fn parse_control_line(line: &str) -> Option<ControlMessage> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    if line.starts_with('{') {
        return match CalibrationParameters::from_json(line) {
            Ok(params) => Some(ControlMessage::Calibration(params)),
            Err(e) => {
                warn!("calibration rejected: {}", e);
                None
            }
        };
    }
    let command = Command::parse(line);
    if command.is_none() {
        debug!("ignoring control line {:?}", line);
    }
    command.map(ControlMessage::Command)
}

pub struct ControlChannel {
    handle: JoinHandle<()>,
}

impl ControlChannel {
    pub fn spawn_stdin(bus: EventBus<ControlMessage>) -> io::Result<Self> {
        Self::spawn_reader(io::BufReader::new(io::stdin()), bus)
    }

    /// Reads `reader` to the end on a background thread.
    pub fn spawn_reader<R>(reader: R, bus: EventBus<ControlMessage>) -> io::Result<Self>
    where
        R: BufRead + Send + 'static,
    {
        let handle = thread::Builder::new()
            .name("gazex-control".into())
            .spawn(move || {
                for line in reader.lines() {
                    match line {
                        Ok(line) => {
                            if let Some(message) = parse_control_line(&line) {
                                bus.publish(message);
                            }
                        }
                        Err(e) => {
                            warn!("control channel read failed: {}", e);
                            break;
                        }
                    }
                }
                info!("control channel closed");
            })?;
        Ok(Self { handle })
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits for the reader to hit end of input.
    pub fn join(self) {
        if self.handle.join().is_err() {
            warn!("control reader panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn commands_and_calibrations_parse() {
        assert_eq!(
            parse_control_line("  begin \n"),
            Some(ControlMessage::Command(Command::Begin))
        );
        assert_eq!(parse_control_line("Jump"), None);
        assert_eq!(parse_control_line(""), None);

        match parse_control_line(r#"{"el_IP": "10.0.0.2", "pix_per_deg": 42.0}"#) {
            Some(ControlMessage::Calibration(p)) => {
                assert_eq!(p.address, "10.0.0.2");
                assert_eq!(p.pixels_per_degree, 42.0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(parse_control_line(r#"{"pix_per_deg": -1.0}"#), None);
        assert_eq!(parse_control_line("{not json"), None);
    }

    #[test]
    fn reader_publishes_until_eof() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        let input = Cursor::new("Begin\nnoise\nPause\nResume\nEnd\n");
        ControlChannel::spawn_reader(input, bus).unwrap().join();
        let got = sub.drain();
        assert_eq!(
            got,
            vec![
                ControlMessage::Command(Command::Begin),
                ControlMessage::Command(Command::Pause),
                ControlMessage::Command(Command::Resume),
                ControlMessage::Command(Command::End),
            ]
        );
    }
}
