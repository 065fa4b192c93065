//! In-process stand-ins for tracker drivers, used by headless sessions and tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::device::{BinocularSample, DisplayTracker, Probe, RawTracker, TrackedEye, TransducerSample};
use crate::error::EyeError;
use crate::watchdog::ProbeFactory;

/// Simulated network path to a raw tracker. The tracker only comes up after a number of
/// handshakes, each of which takes `handshake_delay`.
#[derive(Debug)]
pub struct SimulatedLink {
    handshakes_needed: u64,
    handshake_delay: Duration,
    handshakes: AtomicU64,
    up: AtomicBool,
}

impl SimulatedLink {
    pub fn new(handshakes_needed: u64, handshake_delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            handshakes_needed,
            handshake_delay,
            handshakes: AtomicU64::new(0),
            up: AtomicBool::new(false),
        })
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::SeqCst)
    }

    pub fn handshakes(&self) -> u64 {
        self.handshakes.load(Ordering::SeqCst)
    }

    /// Drops the tracker off the network. It needs a fresh run of handshakes to return.
    pub fn go_down(&self) {
        self.up.store(false, Ordering::SeqCst);
        self.handshakes.store(0, Ordering::SeqCst);
    }

    pub fn probe_factory(self: &Arc<Self>) -> ProbeFactory {
        let link = Arc::clone(self);
        Arc::new(move || -> Box<dyn Probe> { Box::new(SimulatedProbe::new(Arc::clone(&link))) })
    }
}

pub struct SimulatedProbe {
    link: Arc<SimulatedLink>,
    connected: bool,
}

impl SimulatedProbe {
    pub fn new(link: Arc<SimulatedLink>) -> Self {
        Self {
            link,
            connected: false,
        }
    }
}

impl Probe for SimulatedProbe {
    fn open(&mut self, address: &str, timeout: Duration) -> Result<(), EyeError> {
        if self.link.handshake_delay > timeout {
            std::thread::sleep(timeout);
            return Err(EyeError::Timeout {
                address: address.to_string(),
                timeout,
            });
        }
        std::thread::sleep(self.link.handshake_delay);
        let n = self.link.handshakes.fetch_add(1, Ordering::SeqCst) + 1;
        if n >= self.link.handshakes_needed {
            self.link.up.store(true, Ordering::SeqCst);
        }
        self.connected = self.link.is_up();
        if self.connected {
            Ok(())
        } else {
            Err(EyeError::Refused(address.to_string()))
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

pub struct SimulatedRawTracker {
    link: Arc<SimulatedLink>,
    samples: Receiver<TransducerSample>,
    eye: TrackedEye,
    connected: bool,
    recording: bool,
}

impl SimulatedRawTracker {
    /// Returns the tracker and the sender that feeds it samples.
    pub fn new(link: Arc<SimulatedLink>, eye: TrackedEye) -> (Self, Sender<TransducerSample>) {
        let (tx, rx) = unbounded();
        let tracker = Self {
            link,
            samples: rx,
            eye,
            connected: false,
            recording: false,
        };
        (tracker, tx)
    }
}

impl RawTracker for SimulatedRawTracker {
    fn is_connected(&self) -> bool {
        self.connected && self.link.is_up()
    }

    fn open(&mut self, address: &str) -> Result<(), EyeError> {
        self.connected = self.link.is_up();
        if self.connected {
            Ok(())
        } else {
            Err(EyeError::Refused(address.to_string()))
        }
    }

    fn start_streaming(&mut self) -> Result<(), EyeError> {
        if !self.is_connected() {
            return Err(EyeError::NotConnected);
        }
        while self.samples.try_recv().is_ok() {}
        self.recording = true;
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.is_connected() && self.recording
    }

    fn newest_sample(&mut self) -> Result<Option<TransducerSample>, EyeError> {
        if !self.is_connected() {
            return Err(EyeError::NotConnected);
        }
        Ok(self.samples.try_iter().last())
    }

    fn eye_available(&self) -> TrackedEye {
        self.eye
    }

    fn close(&mut self) {
        self.connected = false;
        self.recording = false;
    }
}

pub struct SimulatedDisplayTracker {
    samples: Receiver<BinocularSample>,
    per_poll: Option<usize>,
    connected: bool,
}

impl SimulatedDisplayTracker {
    /// A connected tracker fed through the returned sender. Each poll drains everything
    /// sent since the previous one.
    pub fn channel() -> (Self, Sender<BinocularSample>) {
        let (tx, rx) = unbounded();
        let tracker = Self {
            samples: rx,
            per_poll: None,
            connected: true,
        };
        (tracker, tx)
    }

    /// Plays back a fixed script, one sample per poll.
    pub fn scripted(samples: impl IntoIterator<Item = BinocularSample>) -> Self {
        let (tx, rx) = unbounded();
        for s in samples {
            // the receiver is alive, send cannot fail
            let _ = tx.send(s);
        }
        Self {
            samples: rx,
            per_poll: Some(1),
            connected: true,
        }
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }
}

impl DisplayTracker for SimulatedDisplayTracker {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn poll(&mut self) -> Vec<BinocularSample> {
        match self.per_poll {
            Some(n) => self.samples.try_iter().take(n).collect(),
            None => self.samples.try_iter().collect(),
        }
    }
}
