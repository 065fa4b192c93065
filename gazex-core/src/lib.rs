pub mod bus;
pub mod command;
pub mod phase;
pub mod target;
pub mod trial;

pub use bus::{EventBus, Subscription};
pub use command::Command;
pub use phase::{PhaseCodeError, PhaseCodeTable, TrialPhase};
pub use target::{INVALID_PIXEL, ObjectId, ObjectKind, TargetWindow, Vec2, invalid_pixel, is_invalid_pixel};
pub use trial::{
    Condition, Pose, RewardTier, TrialObject, TrialOutcome, TrialParameters, TrialSummary,
};
