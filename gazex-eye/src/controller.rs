//! Per-tick glue between a tracker driver, the calibration model and the gaze
//! processor. Controllers run on the frame loop and never block on the device.

use gazex_core::Vec2;
use tracing::{debug, info, warn};

use crate::calibration::{CalibratedGaze, CalibrationModel};
use crate::device::{DisplayTracker, RawSample, RawTracker, TrackedEye};
use crate::gaze::{GazeProcessor, GazeReport};
use crate::watchdog::{ConnectionWatchdog, ProbeFactory, WatchdogConfig};

/// A calibrated sample and the gaze processor's verdict on it.
#[derive(Clone, Debug, PartialEq)]
pub struct GazeUpdate {
    /// Gaze in device units: degrees for raw trackers, ADCS for display trackers.
    pub device: Vec2,
    pub gaze: CalibratedGaze,
    pub report: GazeReport,
}

/// What a controller produced on one tick. Both parts are empty when the device had
/// nothing new.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EyeTick {
    pub update: Option<GazeUpdate>,
    /// Raw sample stream rows, see [`BinocularSample::channels`](crate::BinocularSample::channels).
    pub samples: Vec<[f64; 10]>,
}

pub trait EyeController {
    fn tick(&mut self, model: &CalibrationModel, gaze: &mut GazeProcessor, now_ns: u64) -> EyeTick;
    fn is_connected(&self) -> bool;
    fn shutdown(&mut self) {}
}

/// Drives a raw-transducer tracker. First contact goes through the watchdog; once it
/// reports the tracker reachable the connection is opened here, then samples stream.
pub struct RawTrackerController<T: RawTracker> {
    tracker: T,
    watchdog: ConnectionWatchdog,
    eye: TrackedEye,
    streaming: bool,
    last_sample_time: Option<u64>,
}

impl<T: RawTracker> RawTrackerController<T> {
    pub fn new(tracker: T, probes: ProbeFactory, config: WatchdogConfig) -> Self {
        Self {
            tracker,
            watchdog: ConnectionWatchdog::new(probes, config),
            eye: TrackedEye::Unknown,
            streaming: false,
            last_sample_time: None,
        }
    }

    pub fn watchdog(&self) -> &ConnectionWatchdog {
        &self.watchdog
    }

    pub fn tracked_eye(&self) -> TrackedEye {
        self.eye
    }

    fn connect(&mut self, model: &CalibrationModel, address: &str) {
        if self.streaming {
            warn!("tracker at {} lost, reconnecting", address);
            self.streaming = false;
            self.watchdog.stop();
            self.watchdog.start(address);
            return;
        }

        if self.watchdog.is_online() {
            match self.tracker.open(address) {
                Ok(()) if self.tracker.is_connected() => {
                    info!("tracker connected at {}", address);
                    self.watchdog.stop();
                    match self.tracker.start_streaming() {
                        Ok(()) => self.streaming = true,
                        Err(e) => warn!("could not start sample stream: {}", e),
                    }
                }
                Ok(()) => {}
                Err(e) => {
                    warn!("open of {} failed after probe success: {}", address, e);
                    self.watchdog.stop();
                    self.watchdog.start(address);
                }
            }
        } else if !self.watchdog.is_running() && !self.watchdog.has_worker() {
            self.eye = model.tracked_eye().unwrap_or_default();
            self.watchdog.start(address);
        }
    }
}

impl<T: RawTracker> EyeController for RawTrackerController<T> {
    fn tick(&mut self, model: &CalibrationModel, gaze: &mut GazeProcessor, _now_ns: u64) -> EyeTick {
        let Some(address) = model.address().map(str::to_string) else {
            return EyeTick::default();
        };

        if !self.tracker.is_connected() {
            self.connect(model, &address);
            return EyeTick::default();
        }
        if !self.tracker.is_recording() {
            return EyeTick::default();
        }

        let sample = match self.tracker.newest_sample() {
            Ok(Some(s)) => s,
            Ok(None) => return EyeTick::default(),
            Err(e) => {
                debug!("sample read failed: {}", e);
                return EyeTick::default();
            }
        };
        if self.last_sample_time == Some(sample.time) {
            return EyeTick::default();
        }

        if self.eye == TrackedEye::Binocular {
            self.eye = TrackedEye::Left;
        }
        let Some(raw) = sample.eye(self.eye) else {
            self.eye = self.tracker.eye_available();
            debug!("tracked eye resolved to {:?}", self.eye);
            return EyeTick::default();
        };

        let calibrated = model.to_pixels(&RawSample::Transducer(raw));
        let report = gaze.process_gaze(calibrated.pixels);
        self.last_sample_time = Some(sample.time);
        EyeTick {
            update: Some(GazeUpdate {
                device: calibrated.degrees.unwrap_or_else(gazex_core::invalid_pixel),
                gaze: calibrated,
                report,
            }),
            samples: Vec::new(),
        }
    }

    fn is_connected(&self) -> bool {
        self.tracker.is_connected()
    }

    fn shutdown(&mut self) {
        self.watchdog.stop();
        self.tracker.close();
        self.streaming = false;
    }
}

/// Drives a tracker that delivers display coordinates, usually binocular.
pub struct DisplayTrackerController<T: DisplayTracker> {
    tracker: T,
    eye: TrackedEye,
}

impl<T: DisplayTracker> DisplayTrackerController<T> {
    /// `eye` picks a single eye; binocular or unknown averages both.
    pub fn new(tracker: T, eye: TrackedEye) -> Self {
        Self { tracker, eye }
    }
}

impl<T: DisplayTracker> EyeController for DisplayTrackerController<T> {
    fn tick(&mut self, model: &CalibrationModel, gaze: &mut GazeProcessor, now_ns: u64) -> EyeTick {
        if !self.tracker.is_connected() {
            return EyeTick::default();
        }
        let queued = self.tracker.poll();
        let samples = queued.iter().map(|s| s.channels(now_ns)).collect();

        let update = queued
            .last()
            .and_then(|latest| latest.combined(self.eye))
            .map(|adcs| {
                let calibrated = model.to_pixels(&RawSample::Adcs(adcs));
                GazeUpdate {
                    device: adcs,
                    gaze: calibrated,
                    report: gaze.process_gaze(calibrated.pixels),
                }
            });
        EyeTick { update, samples }
    }

    fn is_connected(&self) -> bool {
        self.tracker.is_connected()
    }
}

/// Stands in for a tracker integration missing from this build. Says so once, then
/// does nothing.
pub struct UnsupportedController {
    kind: String,
}

impl UnsupportedController {
    pub fn new(kind: &str) -> Self {
        warn!("{} trackers are not supported on this platform, eye tracking disabled", kind);
        Self {
            kind: kind.to_string(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl EyeController for UnsupportedController {
    fn tick(&mut self, _model: &CalibrationModel, _gaze: &mut GazeProcessor, _now_ns: u64) -> EyeTick {
        EyeTick::default()
    }

    fn is_connected(&self) -> bool {
        false
    }
}
