use std::fmt;

use gazex_core::{Condition, Pose, RewardTier};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Fixed phase durations in milliseconds. A zero duration lasts one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseTimings {
    pub iti_ms: u64,
    /// Only used when a trial has no fixation requirement.
    pub start_of_trial_ms: u64,
    pub delay_1_ms: u64,
    pub cue_ms: u64,
    pub delay_2_ms: u64,
    pub distractor_ms: u64,
    pub delay_3_ms: u64,
    pub force_fov_ms: u64,
    pub target_ms: u64,
    pub end_of_trial_ms: u64,
    pub feedback_ms: u64,
    pub reward_ms: u64,
    pub resume_ms: u64,
}

impl Default for PhaseTimings {
    fn default() -> Self {
        Self {
            iti_ms: 1000,
            start_of_trial_ms: 0,
            delay_1_ms: 200,
            cue_ms: 500,
            delay_2_ms: 200,
            distractor_ms: 0,
            delay_3_ms: 200,
            force_fov_ms: 0,
            target_ms: 0,
            end_of_trial_ms: 0,
            feedback_ms: 500,
            reward_ms: 500,
            resume_ms: 0,
        }
    }
}

/// Parameters of the task being run. Object names are interned into the session's
/// object registry; positions are screen pixels, origin bottom-left.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskConfig {
    /// Trials are this many shuffled copies of the condition table.
    pub number_of_sets: u32,
    pub start_positions: Vec<Pose>,
    /// Skip the ITI delay between trials.
    pub continuous_trials: bool,
    pub max_trial_time_ms: u64,
    /// Added to the ITI after an incorrect choice.
    pub error_penalty_ms: u64,
    /// Added to the ITI after a trial ran out of time.
    pub ignore_penalty_ms: u64,

    pub fixation_objects: Vec<String>,
    /// Fixation positions relative to the screen, 0..1 per axis.
    pub screen_fixation_offsets: Vec<[f32; 2]>,
    pub fixation_object_size: f32,
    /// Window radius as a fraction of the fixation size. 0.5 is the object itself.
    pub fixation_window: f32,

    pub cue_objects: Vec<String>,
    pub target_objects: Vec<String>,
    pub distractor_objects: Vec<String>,
    pub object_size: f32,
    pub object_window: f32,
    pub n_targets: usize,
    /// Zero disables distractors.
    pub n_distractors: usize,
    pub possible_positions: Vec<[f32; 2]>,
    pub response_time_ms: u64,
    pub conditions: Vec<Condition>,
    /// Reward for choosing the n-th target of a trial. Missing entries pay in full.
    pub target_rewards: Vec<RewardTier>,

    pub timings: PhaseTimings,
    /// Dwell ticks on a fixation window that start the trial. Zero uses the timer.
    pub fixation_dwell: u32,
    /// Dwell ticks on a target or distractor that count as a choice.
    pub response_dwell: u32,
    /// Hold the ITI while the joystick is off-centre.
    pub joystick_blocking: bool,
    pub joystick_deadzone: f32,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            number_of_sets: 15,
            start_positions: vec![Pose::default()],
            continuous_trials: true,
            max_trial_time_ms: 50_000,
            error_penalty_ms: 0,
            ignore_penalty_ms: 0,
            fixation_objects: vec!["Fixation".to_string()],
            screen_fixation_offsets: vec![[0.5, 0.5]],
            fixation_object_size: 20.0,
            fixation_window: 2.5,
            cue_objects: vec!["Cue".to_string()],
            target_objects: vec!["Target0".to_string(), "Target1".to_string()],
            distractor_objects: vec!["Distractor0".to_string(), "Distractor1".to_string()],
            object_size: 120.0,
            object_window: 0.5,
            n_targets: 1,
            n_distractors: 1,
            possible_positions: vec![
                [660.0, 540.0],
                [1260.0, 540.0],
                [960.0, 840.0],
                [960.0, 240.0],
            ],
            response_time_ms: 1000,
            conditions: vec![
                Condition {
                    cue: "red".to_string(),
                    targets: vec!["red".to_string()],
                    distractors: vec!["blue".to_string()],
                },
                Condition {
                    cue: "blue".to_string(),
                    targets: vec!["blue".to_string()],
                    distractors: vec!["red".to_string()],
                },
            ],
            target_rewards: Vec::new(),
            timings: PhaseTimings::default(),
            fixation_dwell: 5,
            response_dwell: 5,
            joystick_blocking: false,
            joystick_deadzone: 0.05,
        }
    }
}

/// A change `validate` made to keep the task runnable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Adjustment {
    ContinuousTrialsDisabled,
    TargetsClamped { from: usize, to: usize },
    DistractorsClamped { from: usize, to: usize },
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContinuousTrialsDisabled => {
                write!(f, "continuous trials disabled, an error penalty is set")
            }
            Self::TargetsClamped { from, to } => write!(f, "n_targets clamped from {from} to {to}"),
            Self::DistractorsClamped { from, to } => {
                write!(f, "n_distractors clamped from {from} to {to}")
            }
        }
    }
}

impl TaskConfig {
    /// Makes the configuration consistent. Counts never fail: they are clamped to the
    /// configured objects, then to the available positions with distractors given up
    /// before targets.
    pub fn validate(&mut self) -> Result<Vec<Adjustment>, ConfigError> {
        if self.conditions.is_empty() {
            return Err(ConfigError::NoConditions);
        }
        for (what, value) in [
            ("fixation_object_size", self.fixation_object_size),
            ("fixation_window", self.fixation_window),
            ("object_size", self.object_size),
            ("object_window", self.object_window),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::NonPositive { what, value });
            }
        }

        let mut adjustments = Vec::new();
        if self.error_penalty_ms > 0 && self.continuous_trials {
            self.continuous_trials = false;
            adjustments.push(Adjustment::ContinuousTrialsDisabled);
        }

        let (targets, distractors) = (self.n_targets, self.n_distractors);
        let mut n_targets = targets.min(self.target_objects.len());
        let mut n_distractors = distractors.min(self.distractor_objects.len());
        let positions = self.possible_positions.len();
        if n_targets + n_distractors > positions {
            n_distractors = positions.saturating_sub(n_targets);
            n_targets = n_targets.min(positions);
        }

        if n_targets != targets {
            adjustments.push(Adjustment::TargetsClamped {
                from: targets,
                to: n_targets,
            });
        }
        if n_distractors != distractors {
            adjustments.push(Adjustment::DistractorsClamped {
                from: distractors,
                to: n_distractors,
            });
        }
        self.n_targets = n_targets;
        self.n_distractors = n_distractors;
        Ok(adjustments)
    }

    pub fn reward_for(&self, target_index: usize) -> RewardTier {
        self.target_rewards
            .get(target_index)
            .copied()
            .unwrap_or(RewardTier::Full)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(prefix: &str, n: usize) -> Vec<String> {
        (0..n).map(|i| format!("{prefix}{i}")).collect()
    }

    #[test]
    fn defaults_are_valid() {
        let mut c = TaskConfig::default();
        assert_eq!(c.validate(), Ok(vec![]));
    }

    #[test]
    fn targets_clamp_to_objects_then_distractors_to_positions() {
        let mut c = TaskConfig {
            n_targets: 5,
            n_distractors: 2,
            target_objects: names("Target", 3),
            distractor_objects: names("Distractor", 4),
            possible_positions: vec![[0.0, 0.0]; 4],
            ..Default::default()
        };
        let adj = c.validate().unwrap();
        assert_eq!(c.n_targets, 3);
        assert_eq!(c.n_distractors, 1);
        assert_eq!(
            adj,
            vec![
                Adjustment::TargetsClamped { from: 5, to: 3 },
                Adjustment::DistractorsClamped { from: 2, to: 1 },
            ]
        );
    }

    #[test]
    fn targets_give_way_only_when_distractors_are_gone() {
        let mut c = TaskConfig {
            n_targets: 3,
            n_distractors: 2,
            target_objects: names("Target", 3),
            distractor_objects: names("Distractor", 2),
            possible_positions: vec![[0.0, 0.0]; 2],
            ..Default::default()
        };
        c.validate().unwrap();
        assert_eq!((c.n_targets, c.n_distractors), (2, 0));
    }

    #[test]
    fn error_penalty_disables_continuous_trials() {
        let mut c = TaskConfig {
            error_penalty_ms: 500,
            ..Default::default()
        };
        assert_eq!(c.validate().unwrap(), vec![Adjustment::ContinuousTrialsDisabled]);
        assert!(!c.continuous_trials);
    }

    #[test]
    fn structural_problems_are_errors() {
        let mut c = TaskConfig {
            conditions: vec![],
            ..Default::default()
        };
        assert_eq!(c.validate(), Err(ConfigError::NoConditions));
        let mut c = TaskConfig {
            object_window: 0.0,
            ..Default::default()
        };
        assert!(matches!(c.validate(), Err(ConfigError::NonPositive { what: "object_window", .. })));
    }

    #[test]
    fn missing_rewards_pay_in_full() {
        let c = TaskConfig {
            target_rewards: vec![RewardTier::Half],
            ..Default::default()
        };
        assert_eq!(c.reward_for(0), RewardTier::Half);
        assert_eq!(c.reward_for(1), RewardTier::Full);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c: TaskConfig = serde_json::from_str(r#"{ "n_targets": 2, "timings": { "cue_ms": 50 } }"#).unwrap();
        assert_eq!(c.n_targets, 2);
        assert_eq!(c.timings.cue_ms, 50);
        assert_eq!(c.timings.iti_ms, 1000);
        assert_eq!(c.number_of_sets, 15);
    }
}
