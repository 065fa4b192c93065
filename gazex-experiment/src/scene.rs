//! The presentation side of a trial. The state machine only talks to the scene through
//! this trait; what showing an object means is up to the implementation.

use std::collections::BTreeSet;

use gazex_core::{ObjectId, ObjectKind, Pose, RewardTier, TrialObject, TrialOutcome, TrialParameters};
use tracing::debug;

pub trait Scene {
    /// Places the player at the trial's start pose and applies its materials.
    fn prepare_trial(&mut self, trial: &TrialParameters);
    fn show(&mut self, kind: ObjectKind, objects: &[TrialObject]);
    fn hide(&mut self, kind: ObjectKind);
    fn freeze_input(&mut self, frozen: bool);
    fn report_outcome(&mut self, outcome: TrialOutcome);
    fn deliver_reward(&mut self, tier: RewardTier);
    /// Moves the player, used by playback.
    fn set_pose(&mut self, pose: Pose);
    fn pose(&self) -> Pose;

    fn hide_all(&mut self) {
        for kind in [ObjectKind::Cue, ObjectKind::Target, ObjectKind::Distractor] {
            self.hide(kind);
        }
    }
}

/// Scene without a display. Keeps track of what would be visible, for headless sessions
/// and replay.
#[derive(Debug, Clone, Default)]
pub struct HeadlessScene {
    pub visible: BTreeSet<(ObjectKind, ObjectId)>,
    pub frozen: bool,
    pub pose: Pose,
    pub outcomes: Vec<TrialOutcome>,
    pub rewards: Vec<RewardTier>,
}

impl HeadlessScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_visible(&self, kind: ObjectKind, id: ObjectId) -> bool {
        self.visible.contains(&(kind, id))
    }

    pub fn visible_count(&self, kind: ObjectKind) -> usize {
        self.visible.iter().filter(|(k, _)| *k == kind).count()
    }
}

impl Scene for HeadlessScene {
    fn prepare_trial(&mut self, trial: &TrialParameters) {
        self.pose = trial.start_pose;
        debug!("scene prepared for trial {}", trial.trial_number);
    }

    fn show(&mut self, kind: ObjectKind, objects: &[TrialObject]) {
        for o in objects {
            self.visible.insert((kind, o.id));
        }
    }

    fn hide(&mut self, kind: ObjectKind) {
        self.visible.retain(|(k, _)| *k != kind);
    }

    fn freeze_input(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    fn report_outcome(&mut self, outcome: TrialOutcome) {
        self.outcomes.push(outcome);
    }

    fn deliver_reward(&mut self, tier: RewardTier) {
        debug!("reward x{}", tier.multiplier());
        self.rewards.push(tier);
    }

    fn set_pose(&mut self, pose: Pose) {
        self.pose = pose;
    }

    fn pose(&self) -> Pose {
        self.pose
    }
}
