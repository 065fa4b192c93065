pub mod config;
pub mod error;
pub mod scene;
pub mod state;
pub mod trial;
pub use config::{Adjustment, PhaseTimings, TaskConfig};
pub use error::{ConfigError, ExperimentError};
pub use scene::{HeadlessScene, Scene};
pub use state::{ExperimentEvent, PhaseContext, TrialEvent, TrialStateMachine, next_phase};
pub use trial::TrialGenerator;
