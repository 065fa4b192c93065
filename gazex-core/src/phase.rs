use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::trial::RewardTier;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PhaseCodeError {
    #[error("unknown phase name `{0}`")]
    UnknownPhase(String),
    #[error("unknown phase code table `{0}`")]
    UnknownTable(String),
}

/// Trial phases, declared in ordinal order. The ordinal is the code published in the
/// session's phase map and used by [`PhaseCodeTable::Ordinal`].
#[derive(Copy, Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TrialPhase {
    #[serde(rename = "ITI")]
    Iti,
    StartOfTrial,
    #[serde(rename = "Delay_1")]
    Delay1,
    Cue,
    #[serde(rename = "Delay_2")]
    Delay2,
    Distractor,
    #[serde(rename = "Delay_3")]
    Delay3,
    #[serde(rename = "ForceFOV")]
    ForceFov,
    Target,
    Response,
    EndOfTrial,
    Feedback,
    Pause,
    Resume,
    #[default]
    Setup,
    QuarterReward,
    HalfReward,
    ThreeQuarterReward,
    FullReward,
    NoReward,
    Null,
}

impl TrialPhase {
    pub const ALL: [TrialPhase; 21] = [
        Self::Iti,
        Self::StartOfTrial,
        Self::Delay1,
        Self::Cue,
        Self::Delay2,
        Self::Distractor,
        Self::Delay3,
        Self::ForceFov,
        Self::Target,
        Self::Response,
        Self::EndOfTrial,
        Self::Feedback,
        Self::Pause,
        Self::Resume,
        Self::Setup,
        Self::QuarterReward,
        Self::HalfReward,
        Self::ThreeQuarterReward,
        Self::FullReward,
        Self::NoReward,
        Self::Null,
    ];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Iti => "ITI",
            Self::StartOfTrial => "StartOfTrial",
            Self::Delay1 => "Delay_1",
            Self::Cue => "Cue",
            Self::Delay2 => "Delay_2",
            Self::Distractor => "Distractor",
            Self::Delay3 => "Delay_3",
            Self::ForceFov => "ForceFOV",
            Self::Target => "Target",
            Self::Response => "Response",
            Self::EndOfTrial => "EndOfTrial",
            Self::Feedback => "Feedback",
            Self::Pause => "Pause",
            Self::Resume => "Resume",
            Self::Setup => "Setup",
            Self::QuarterReward => "QuarterReward",
            Self::HalfReward => "HalfReward",
            Self::ThreeQuarterReward => "ThreeQuarterReward",
            Self::FullReward => "FullReward",
            Self::NoReward => "NoReward",
            Self::Null => "Null",
        }
    }

    /// Phases between trial start and the response decision. A trial is "running"
    /// while one of these is active.
    pub fn is_in_trial(self) -> bool {
        matches!(
            self,
            Self::StartOfTrial
                | Self::Delay1
                | Self::Cue
                | Self::Delay2
                | Self::Distractor
                | Self::Delay3
                | Self::ForceFov
                | Self::Target
                | Self::Response
        )
    }

    pub fn reward_tier(self) -> Option<RewardTier> {
        Some(match self {
            Self::QuarterReward => RewardTier::Quarter,
            Self::HalfReward => RewardTier::Half,
            Self::ThreeQuarterReward => RewardTier::ThreeQuarter,
            Self::FullReward => RewardTier::Full,
            Self::NoReward => RewardTier::None,
            _ => return None,
        })
    }

    pub fn for_reward(tier: RewardTier) -> Self {
        match tier {
            RewardTier::Quarter => Self::QuarterReward,
            RewardTier::Half => Self::HalfReward,
            RewardTier::ThreeQuarter => Self::ThreeQuarterReward,
            RewardTier::Full => Self::FullReward,
            RewardTier::None => Self::NoReward,
        }
    }
}

impl fmt::Display for TrialPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TrialPhase {
    type Err = PhaseCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        TrialPhase::ALL
            .into_iter()
            .find(|p| p.name() == s || format!("{p:?}") == s)
            .ok_or_else(|| PhaseCodeError::UnknownPhase(s.to_string()))
    }
}

use TrialPhase::*;

const LEGACY: [TrialPhase; 14] = [
    Iti,
    StartOfTrial,
    Delay1,
    Cue,
    Delay2,
    Distractor,
    Delay3,
    Target,
    Response,
    EndOfTrial,
    Feedback,
    Pause,
    Resume,
    Null,
];

const EXTENDED: [TrialPhase; 15] = [
    Iti,
    StartOfTrial,
    Delay1,
    Cue,
    Delay2,
    Distractor,
    Delay3,
    ForceFov,
    Target,
    Response,
    EndOfTrial,
    Feedback,
    Pause,
    Resume,
    Null,
];

/// Versioned integer <-> phase mappings found on the telemetry wire.
///
/// The recorders that produced existing data disagree: the older playback format has
/// no ForceFOV slot (Target = 7), the newer one does (Target = 8), and the live phase
/// map publishes the full enumeration ordinal where 14 is Setup rather than Null.
/// Pick the table that matches the producer; none is canonical.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseCodeTable {
    /// Fourteen codes, no ForceFOV: Target = 7, Null = 13.
    Legacy,
    /// Fifteen codes with ForceFOV: Target = 8, Null = 14.
    Extended,
    /// Every phase by enumeration ordinal: Setup = 14, Null = 20.
    #[default]
    Ordinal,
}

impl PhaseCodeTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Extended => "extended",
            Self::Ordinal => "ordinal",
        }
    }

    fn phases(self) -> &'static [TrialPhase] {
        match self {
            Self::Legacy => &LEGACY,
            Self::Extended => &EXTENDED,
            Self::Ordinal => &TrialPhase::ALL,
        }
    }

    pub fn decode(self, code: i64) -> Option<TrialPhase> {
        usize::try_from(code)
            .ok()
            .and_then(|i| self.phases().get(i).copied())
    }

    /// Decodes a code carried in a floating-point telemetry channel. The value is
    /// truncated toward zero; non-finite values decode to nothing.
    pub fn decode_f64(self, raw: f64) -> Option<TrialPhase> {
        if !raw.is_finite() {
            return None;
        }
        self.decode(raw.trunc() as i64)
    }

    pub fn encode(self, phase: TrialPhase) -> Option<u8> {
        self.phases()
            .iter()
            .position(|p| *p == phase)
            .map(|i| i as u8)
    }

    /// Code for `phase`, or this table's Null code when the table has no slot for it.
    pub fn encode_or_null(self, phase: TrialPhase) -> u8 {
        self.encode(phase)
            .unwrap_or((self.phases().len() - 1) as u8)
    }

    pub fn entries(self) -> impl Iterator<Item = (u8, TrialPhase)> {
        self.phases()
            .iter()
            .enumerate()
            .map(|(i, p)| (i as u8, *p))
    }
}

impl FromStr for PhaseCodeTable {
    type Err = PhaseCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "legacy" => Ok(Self::Legacy),
            "extended" => Ok(Self::Extended),
            "ordinal" => Ok(Self::Ordinal),
            other => Err(PhaseCodeError::UnknownTable(other.to_string())),
        }
    }
}
