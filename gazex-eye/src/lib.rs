//! Eye tracking pipeline: device samples are calibrated into screen pixels and
//! hit-tested against the active gaze windows.

pub mod calibration;
pub mod controller;
pub mod device;
pub mod error;
pub mod gaze;
pub mod sim;
pub mod watchdog;

pub use calibration::{CalibratedGaze, CalibrationModel, CalibrationParameters, Resolution};
pub use controller::{
    DisplayTrackerController, EyeController, EyeTick, GazeUpdate, RawTrackerController,
    UnsupportedController,
};
pub use device::{
    BinocularSample, DisplayTracker, EyeSample, Probe, RawSample, RawTracker, TrackedEye,
    TransducerSample,
};
pub use error::EyeError;
pub use gaze::{Activation, GazeProcessor, GazeReport};
pub use sim::{SimulatedDisplayTracker, SimulatedLink, SimulatedProbe, SimulatedRawTracker};
pub use watchdog::{ConnectionWatchdog, ProbeFactory, WatchdogConfig};
