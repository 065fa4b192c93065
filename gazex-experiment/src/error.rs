use gazex_core::{PhaseCodeTable, TrialPhase};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("no conditions configured")]
    NoConditions,
    #[error("{what} must be positive, got {value}")]
    NonPositive { what: &'static str, value: f32 },
    #[error("configuration parse error: {0}")]
    Parse(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum ExperimentError {
    #[error("trials can only be loaded in Setup or Pause, machine is in {0}")]
    TrialsLocked(TrialPhase),
    #[error("code {code} is not in the {} phase table", table.as_str())]
    UnknownPhaseCode { code: i64, table: PhaseCodeTable },
}
