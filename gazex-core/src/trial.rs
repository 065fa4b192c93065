use serde::{Deserialize, Serialize};

use crate::target::{ObjectId, TargetWindow};

/// Player start pose: world position and heading in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: [f32; 3],
    pub yaw: f32,
}

/// Maps a cue to the target and distractor materials used with it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Condition {
    pub cue: String,
    pub targets: Vec<String>,
    pub distractors: Vec<String>,
}

/// An object taking part in a trial. Objects without a screen position have no gaze
/// window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialObject {
    pub id: ObjectId,
    pub material: Option<String>,
    pub window: Option<TargetWindow>,
}

/// Everything bound to a trial when it is prepared. Immutable until the next ITI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialParameters {
    pub trial_number: u32,
    pub start_pose: Pose,
    pub condition: Condition,
    pub fixations: Vec<TargetWindow>,
    pub cues: Vec<TrialObject>,
    pub targets: Vec<TrialObject>,
    pub distractors: Vec<TrialObject>,
}

impl TrialParameters {
    pub fn windows<'a>(objects: &'a [TrialObject]) -> impl Iterator<Item = &'a TargetWindow> + 'a {
        objects.iter().filter_map(|o| o.window.as_ref())
    }

    pub fn target_index(&self, id: ObjectId) -> Option<usize> {
        self.targets.iter().position(|t| t.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrialOutcome {
    Correct { target: ObjectId },
    Incorrect { distractor: ObjectId },
    Ignored,
    Aborted,
}

impl TrialOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Correct { .. } => "correct",
            Self::Incorrect { .. } => "incorrect",
            Self::Ignored => "ignored",
            Self::Aborted => "aborted",
        }
    }

    pub fn chosen(&self) -> Option<ObjectId> {
        match self {
            Self::Correct { target } => Some(*target),
            Self::Incorrect { distractor } => Some(*distractor),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardTier {
    Quarter,
    Half,
    ThreeQuarter,
    Full,
    None,
}

impl RewardTier {
    pub fn multiplier(&self) -> f32 {
        match self {
            Self::Quarter => 0.25,
            Self::Half => 0.5,
            Self::ThreeQuarter => 0.75,
            Self::Full => 1.0,
            Self::None => 0.0,
        }
    }
}

/// Recorded result per trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialSummary {
    pub trial_number: u32,
    pub outcome: TrialOutcome,
    pub reward: RewardTier,
    pub reaction_time_ns: Option<u64>,
    pub timestamp_ns: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcomes_are_tagged_by_kind() {
        let json = serde_json::to_string(&TrialOutcome::Correct { target: ObjectId(4) }).unwrap();
        assert_eq!(json, r#"{"kind":"correct","target":4}"#);
        let back: TrialOutcome = serde_json::from_str(r#"{"kind":"ignored"}"#).unwrap();
        assert_eq!(back, TrialOutcome::Ignored);
    }
}
