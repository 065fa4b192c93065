//! Driver boundary. Samples arrive here already decoded by a device driver; the traits
//! describe the handful of calls the controllers make against it.

use gazex_core::Vec2;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::EyeError;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedEye {
    Left,
    Right,
    Binocular,
    #[default]
    Unknown,
}

/// One device-native gaze reading.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RawSample {
    /// Normalized active display coordinates, [0,1] x [0,1], origin top-left.
    Adcs(Vec2),
    /// Raw transducer counts that need the full calibration pipeline.
    Transducer(Vec2),
}

/// Newest reading from a raw-transducer tracker.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TransducerSample {
    /// Device timestamp, monotonic.
    pub time: u64,
    pub left: Vec2,
    pub right: Vec2,
}

impl TransducerSample {
    /// Counts for a single eye. Binocular selections read the left eye.
    pub fn eye(&self, eye: TrackedEye) -> Option<Vec2> {
        match eye {
            TrackedEye::Left | TrackedEye::Binocular => Some(self.left),
            TrackedEye::Right => Some(self.right),
            TrackedEye::Unknown => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct EyeSample {
    /// Gaze point in ADCS.
    pub x: f32,
    pub y: f32,
    pub pupil: f32,
    pub valid: bool,
}

impl EyeSample {
    pub fn point(&self) -> Option<Vec2> {
        self.valid.then(|| Vec2::new(self.x, self.y))
    }
}

/// Binocular reading from a display-calibrated tracker.
#[derive(Copy, Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct BinocularSample {
    pub left: EyeSample,
    pub right: EyeSample,
    /// Device clock in microseconds.
    pub device_time_us: u64,
}

impl BinocularSample {
    /// Gaze point for the configured eye. Binocular and unknown selections average the
    /// two eyes and need both to be valid.
    pub fn combined(&self, eye: TrackedEye) -> Option<Vec2> {
        match eye {
            TrackedEye::Left => self.left.point(),
            TrackedEye::Right => self.right.point(),
            TrackedEye::Binocular | TrackedEye::Unknown => {
                Some((self.left.point()? + self.right.point()?) / 2.0)
            }
        }
    }

    /// The ten-channel row written to the raw sample stream.
    pub fn channels(&self, session_time_ns: u64) -> [f64; 10] {
        let v = |b: bool| if b { 1.0 } else { 0.0 };
        [
            self.left.x as f64,
            self.left.y as f64,
            self.left.pupil as f64,
            v(self.left.valid),
            self.right.x as f64,
            self.right.y as f64,
            self.right.pupil as f64,
            v(self.right.valid),
            self.device_time_us as f64,
            session_time_ns as f64 * 1e-9,
        ]
    }
}

/// Throwaway connection handle used only to find out whether a tracker is reachable.
pub trait Probe: Send {
    /// One handshake attempt, bounded by `timeout`.
    fn open(&mut self, address: &str, timeout: Duration) -> Result<(), EyeError>;
    fn is_connected(&self) -> bool;
}

/// Main-thread session with a tracker that reports raw transducer counts.
pub trait RawTracker {
    fn is_connected(&self) -> bool;
    /// Synchronous data-plane open.
    fn open(&mut self, address: &str) -> Result<(), EyeError>;
    /// Reset buffered data and switch the sample stream on.
    fn start_streaming(&mut self) -> Result<(), EyeError>;
    fn is_recording(&self) -> bool;
    /// Non-blocking. `Ok(None)` means nothing new since the last call.
    fn newest_sample(&mut self) -> Result<Option<TransducerSample>, EyeError>;
    fn eye_available(&self) -> TrackedEye;
    fn close(&mut self);
}

/// Tracker that calibrates on-device and reports display coordinates.
pub trait DisplayTracker {
    fn is_connected(&self) -> bool;
    /// Every sample queued since the previous poll, oldest first. Never blocks.
    fn poll(&mut self) -> Vec<BinocularSample>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eye(x: f32, y: f32, valid: bool) -> EyeSample {
        EyeSample {
            x,
            y,
            pupil: 3.0,
            valid,
        }
    }

    #[test]
    fn combined_point_averages_valid_eyes() {
        let s = BinocularSample {
            left: eye(0.4, 0.5, true),
            right: eye(0.6, 0.7, true),
            device_time_us: 10,
        };
        let p = s.combined(TrackedEye::Binocular).unwrap();
        assert!((p.x - 0.5).abs() < 1e-6 && (p.y - 0.6).abs() < 1e-6);
        assert_eq!(s.combined(TrackedEye::Right), Some(Vec2::new(0.6, 0.7)));
    }

    #[test]
    fn combined_point_needs_both_eyes() {
        let s = BinocularSample {
            left: eye(0.4, 0.5, true),
            right: eye(0.6, 0.7, false),
            device_time_us: 10,
        };
        assert_eq!(s.combined(TrackedEye::Unknown), None);
        assert_eq!(s.combined(TrackedEye::Left), Some(Vec2::new(0.4, 0.5)));
    }

    #[test]
    fn channel_row_reports_each_eye_validity() {
        let s = BinocularSample {
            left: eye(0.1, 0.2, true),
            right: eye(0.3, 0.4, false),
            device_time_us: 1_000,
        };
        let row = s.channels(2_000_000_000);
        assert_eq!(row[3], 1.0);
        assert_eq!(row[7], 0.0);
        assert_eq!(row[8], 1_000.0);
        assert_eq!(row[9], 2.0);
    }

    #[test]
    fn binocular_transducer_selection_reads_left() {
        let s = TransducerSample {
            time: 1,
            left: Vec2::new(1.0, 2.0),
            right: Vec2::new(3.0, 4.0),
        };
        assert_eq!(s.eye(TrackedEye::Binocular), Some(Vec2::new(1.0, 2.0)));
        assert_eq!(s.eye(TrackedEye::Unknown), None);
    }
}
