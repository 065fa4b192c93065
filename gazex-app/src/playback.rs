//! Offline replay of a recorded session through the live calibration, gaze and phase
//! code paths.

use std::path::Path;

use anyhow::{Context, Result};
use gazex_core::{EventBus, PhaseCodeTable, TrialParameters, TrialPhase, TrialSummary};
use gazex_experiment::{ExperimentEvent, PhaseContext, Scene, TrialStateMachine};
use gazex_eye::{CalibrationModel, CalibrationParameters, GazeProcessor, GazeReport};
use tracing::{debug, info, warn};

use crate::config::{SessionConfig, TrackerKind};
use crate::telemetry::{self, FrameRecord, TelemetryRecord};

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayFrame {
    pub timestamp_ns: u64,
    /// Phase after the frame's code was applied.
    pub phase: TrialPhase,
    /// Only frames that carried a new gaze sample are hit-tested.
    pub report: Option<GazeReport>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReplayReport {
    pub frames: Vec<ReplayFrame>,
    pub summaries: Vec<TrialSummary>,
    /// One line per completed trial, then "Done".
    pub lines: Vec<String>,
}

pub struct Replayer {
    config: SessionConfig,
    records: Vec<TelemetryRecord>,
}

impl Replayer {
    pub fn load(path: impl AsRef<Path>, config: SessionConfig) -> Result<Self> {
        let path = path.as_ref();
        let records = telemetry::read_file(path)
            .with_context(|| format!("loading recording {}", path.display()))?;
        info!("{} records loaded from {}", records.len(), path.display());
        Ok(Self::from_records(records, config))
    }

    pub fn from_records(records: Vec<TelemetryRecord>, config: SessionConfig) -> Self {
        Self { config, records }
    }

    pub fn run<S: Scene>(&self, scene: &mut S) -> Result<ReplayReport> {
        let (tracker, table, display) = self
            .records
            .iter()
            .find_map(|r| match r {
                TelemetryRecord::Metadata {
                    tracker,
                    phase_table,
                    display,
                    ..
                } => Some((*tracker, *phase_table, *display)),
                _ => None,
            })
            .unwrap_or_else(|| {
                warn!("recording has no metadata, using the session config");
                (
                    self.config.tracker.kind,
                    self.config.telemetry.phase_table,
                    self.config.display,
                )
            });

        let trials: Vec<TrialParameters> = self
            .records
            .iter()
            .filter_map(|r| match r {
                TelemetryRecord::Trial { parameters, .. } => Some(parameters.clone()),
                _ => None,
            })
            .collect();

        let bus = EventBus::new();
        let events = bus.subscribe();
        let mut machine = TrialStateMachine::new(self.config.task.clone(), bus);
        machine.load_trials(trials)?;

        let mut gaze = GazeProcessor::new();
        if let Some(deg) = self.config.tracker.gaze_radius_deg {
            gaze.set_gaze_window(deg);
        }
        let mut state = ReplayState {
            tracker,
            table,
            camera_height: self.config.camera_height,
            model: CalibrationModel::new(display),
            gaze,
            machine,
            scene,
        };

        let mut report = ReplayReport::default();
        for record in &self.records {
            match record {
                TelemetryRecord::Calibration { parameters, .. } => state.calibrate(parameters),
                TelemetryRecord::Frame(frame) => report.frames.push(state.frame(frame)),
                _ => {}
            }
            for event in events.drain() {
                if let ExperimentEvent::TrialCompleted(summary) = event {
                    let line = format!("trial {} {}", summary.trial_number, summary.outcome.as_str());
                    info!("{}", line);
                    report.lines.push(line);
                    report.summaries.push(summary);
                }
            }
        }

        info!("Done");
        report.lines.push("Done".to_string());
        Ok(report)
    }
}

struct ReplayState<'s, S: Scene> {
    tracker: TrackerKind,
    table: PhaseCodeTable,
    camera_height: f32,
    model: CalibrationModel,
    gaze: GazeProcessor,
    machine: TrialStateMachine,
    scene: &'s mut S,
}

impl<S: Scene> ReplayState<'_, S> {
    fn calibrate(&mut self, parameters: &CalibrationParameters) {
        match self.model.apply_calibration(parameters.clone()) {
            Ok(()) => self.gaze.update_calibration(parameters),
            Err(e) => warn!("recorded calibration rejected: {}", e),
        }
    }

    fn frame(&mut self, frame: &FrameRecord) -> ReplayFrame {
        let mut pose = frame.pose();
        pose.position[1] += self.camera_height;
        self.scene.set_pose(pose);

        let report = frame.gaze().map(|g| {
            let pixels = if self.tracker.reports_degrees() {
                self.model.degrees_to_pixels(g)
            } else {
                self.model.adcs_to_pixels(g)
            };
            let report = self.gaze.process_gaze(pixels);
            if report.any_hit() {
                let hits: Vec<String> = report
                    .activations
                    .iter()
                    .filter(|a| a.hit)
                    .map(|a| format!("{} {:?} x{}", a.id, a.kind, a.count))
                    .collect();
                info!("{} ns: {}", frame.timestamp_ns, hits.join(", "));
            }
            report
        });

        let raw = frame.phase_code();
        if raw.is_finite() {
            let code = raw.trunc() as i64;
            // tables without a Setup slot record it as Null
            let premature_null = self.machine.phase() == TrialPhase::Setup
                && self.table.decode(code) == Some(TrialPhase::Null);
            if !premature_null {
                let mut ctx = PhaseContext {
                    now_ns: frame.timestamp_ns,
                    gaze: &mut self.gaze,
                    scene: &mut *self.scene,
                };
                if let Err(e) = self.machine.apply_phase_code(self.table, code, &mut ctx) {
                    debug!("frame at {} ns: {}", frame.timestamp_ns, e);
                }
            }
        }

        ReplayFrame {
            timestamp_ns: frame.timestamp_ns,
            phase: self.machine.phase(),
            report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazex_core::Pose;
    use gazex_experiment::HeadlessScene;

    fn frame(ts: u64, code: f64) -> TelemetryRecord {
        let mut f = FrameRecord::new(ts, Pose::default(), None, 0, 0.0, 0);
        f.values[6] = code;
        TelemetryRecord::Frame(f)
    }

    #[test]
    fn setup_recorded_as_null_is_not_terminal() {
        let records = vec![
            TelemetryRecord::Metadata {
                tracker: TrackerKind::SimDisplay,
                display: Default::default(),
                phase_table: PhaseCodeTable::Legacy,
                phases: PhaseCodeTable::Legacy.entries().collect(),
                objects: Vec::new(),
            },
            frame(0, 13.0),
            frame(1, 0.0),
            frame(2, 99.0),
            frame(3, 11.0),
        ];
        let report = Replayer::from_records(records, SessionConfig::default())
            .run(&mut HeadlessScene::new())
            .unwrap();
        let phases: Vec<_> = report.frames.iter().map(|f| f.phase).collect();
        assert_eq!(
            phases,
            vec![TrialPhase::Setup, TrialPhase::Iti, TrialPhase::Iti, TrialPhase::Pause]
        );
        assert_eq!(report.lines, vec!["Done".to_string()]);
    }

    #[test]
    fn pose_gets_the_camera_height() {
        let pose = Pose {
            position: [1.0, 0.0, 2.0],
            yaw: 45.0,
        };
        let records = vec![TelemetryRecord::Frame(FrameRecord::new(0, pose, None, 14, 0.0, 0))];
        let mut scene = HeadlessScene::new();
        Replayer::from_records(records, SessionConfig::default())
            .run(&mut scene)
            .unwrap();
        assert_eq!(scene.pose.position, [1.0, 0.8, 2.0]);
        assert_eq!(scene.pose.yaw, 45.0);
    }
}
