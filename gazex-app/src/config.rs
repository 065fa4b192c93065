use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use gazex_core::PhaseCodeTable;
use gazex_experiment::TaskConfig;
use gazex_eye::{Resolution, TrackedEye, WatchdogConfig};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TrackerKind {
    #[default]
    None,
    /// Raw-transducer tracker reached over the network.
    Eyelink,
    /// Display-calibrated binocular tracker.
    Tobii,
    /// In-process raw tracker with a slow handshake.
    SimRaw,
    /// In-process display tracker.
    SimDisplay,
}

impl TrackerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Eyelink => "eyelink",
            Self::Tobii => "tobii",
            Self::SimRaw => "sim_raw",
            Self::SimDisplay => "sim_display",
        }
    }

    /// Raw trackers report gaze in degrees, display trackers in ADCS.
    pub fn reports_degrees(&self) -> bool {
        matches!(self, Self::Eyelink | Self::SimRaw)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub kind: TrackerKind,
    /// Overrides the eye named by the calibration.
    pub eye: Option<TrackedEye>,
    /// Minimum gaze window radius in degrees of visual angle.
    pub gaze_radius_deg: Option<f32>,
    pub watchdog: WatchdogConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            kind: TrackerKind::None,
            eye: None,
            gaze_radius_deg: None,
            watchdog: WatchdogConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum InputDevice {
    #[default]
    Null,
    Gamepad,
    Joystick,
    Keyboard,
    Mouse,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub device: InputDevice,
    pub turn_sensitivity: f32,
    pub move_sensitivity: f32,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            device: InputDevice::Null,
            turn_sensitivity: 1.0,
            move_sensitivity: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Code table for the phase channel of the frame stream.
    pub phase_table: PhaseCodeTable,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub display: Resolution,
    pub tracker: TrackerConfig,
    pub input: InputConfig,
    pub task: TaskConfig,
    pub telemetry: TelemetryConfig,
    pub frame_rate_hz: f64,
    /// Seed for trial generation and the photodiode. Unset draws from the OS.
    pub seed: Option<u64>,
    /// Added to the recorded pose height when replaying.
    pub camera_height: f32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            display: Resolution::default(),
            tracker: TrackerConfig::default(),
            input: InputConfig::default(),
            task: TaskConfig::default(),
            telemetry: TelemetryConfig::default(),
            frame_rate_hz: 60.0,
            seed: None,
            camera_height: 0.8,
        }
    }
}

impl SessionConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading session config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing session config {}", path.display()))?;
        info!("loaded session config from {}", path.display());
        config.validated()
    }

    /// Applies the task clamping rules and rejects settings the session cannot run with.
    pub fn validated(mut self) -> Result<Self> {
        if !(self.frame_rate_hz.is_finite() && self.frame_rate_hz > 0.0) {
            bail!("frame_rate_hz must be positive, got {}", self.frame_rate_hz);
        }
        if self.display.width == 0 || self.display.height == 0 {
            bail!("display resolution must be non-zero");
        }
        for adjustment in self.task.validate().context("invalid task configuration")? {
            warn!("{}", adjustment);
        }
        Ok(self)
    }

    pub fn frame_period_ns(&self) -> u64 {
        (1e9 / self.frame_rate_hz) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn load_fills_defaults_and_clamps() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "display": {{ "width": 2560, "height": 1440 }},
                "tracker": {{ "kind": "sim_display", "gaze_radius_deg": 1.5 }},
                "task": {{ "n_targets": 9, "error_penalty_ms": 300 }},
                "telemetry": {{ "phase_table": "extended" }}
            }}"#
        )
        .unwrap();

        let c = SessionConfig::load(file.path()).unwrap();
        assert_eq!(c.display, Resolution::new(2560, 1440));
        assert_eq!(c.tracker.kind, TrackerKind::SimDisplay);
        assert_eq!(c.tracker.gaze_radius_deg, Some(1.5));
        assert_eq!(c.tracker.watchdog, WatchdogConfig::default());
        assert_eq!(c.task.n_targets, 2);
        assert!(!c.task.continuous_trials);
        assert_eq!(c.telemetry.phase_table, PhaseCodeTable::Extended);
        assert_eq!(c.frame_rate_hz, 60.0);
        assert_eq!(c.camera_height, 0.8);
    }

    #[test]
    fn unreadable_or_invalid_configs_fail() {
        assert!(SessionConfig::load("/nonexistent/gazex.json").is_err());

        let c = SessionConfig {
            frame_rate_hz: 0.0,
            ..Default::default()
        };
        assert!(c.validated().is_err());

        let mut c = SessionConfig::default();
        c.task.conditions.clear();
        assert!(c.validated().is_err());
    }

    #[test]
    fn frame_period() {
        let c = SessionConfig {
            frame_rate_hz: 100.0,
            ..Default::default()
        };
        assert_eq!(c.frame_period_ns(), 10_000_000);
    }
}
