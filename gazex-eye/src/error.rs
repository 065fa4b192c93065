use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EyeError {
    #[error("tracker at {address} did not answer within {timeout:?}")]
    Timeout { address: String, timeout: Duration },
    #[error("tracker at {0} refused the connection")]
    Refused(String),
    #[error("tracker is not connected")]
    NotConnected,
    #[error("sample read failed: {0}")]
    Read(String),
    #[error("{0} trackers are not supported on this platform")]
    Unsupported(String),
    #[error("invalid calibration: {0}")]
    InvalidCalibration(String),
    #[error("calibration parse error: {0}")]
    Parse(#[from] serde_json::Error),
}
