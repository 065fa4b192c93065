//! Session runner: wires the eye pipeline and the trial state machine into a fixed-rate
//! frame loop, records telemetry and replays it.

pub mod config;
pub mod control;
pub mod input;
pub mod photodiode;
pub mod playback;
pub mod session;
pub mod subject;
pub mod telemetry;

pub use config::{InputConfig, InputDevice, SessionConfig, TelemetryConfig, TrackerConfig, TrackerKind};
pub use control::{ControlChannel, ControlMessage, parse_control_line};
pub use input::{ChannelInput, InputSource, NullInput, Sensitivity};
pub use photodiode::PhotoDiode;
pub use playback::{ReplayFrame, ReplayReport, Replayer};
pub use session::{Session, SessionReport, StepReport, controller_for};
pub use subject::{ScriptedSubject, gaze_goal};
pub use telemetry::{FrameRecord, JsonLinesTelemetry, TelemetryRecord, TelemetrySink};
