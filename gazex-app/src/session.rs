//! The frame loop. One [`Session::step`] per display frame: device samples first, then
//! control messages, then time-driven transitions, then telemetry.

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::{Context, Result};
use gazex_cache::ObjectRegistry;
use gazex_core::{EventBus, Subscription, TrialPhase, TrialSummary};
use gazex_experiment::{
    ExperimentEvent, PhaseContext, Scene, TrialGenerator, TrialStateMachine,
};
use gazex_eye::{
    CalibrationModel, CalibrationParameters, DisplayTrackerController, EyeController, EyeTick,
    GazeProcessor, GazeUpdate, RawTrackerController, SimulatedDisplayTracker, SimulatedLink,
    SimulatedRawTracker, TrackedEye, UnsupportedController,
};
use gazex_timing::Timer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::config::{SessionConfig, TrackerConfig, TrackerKind};
use crate::control::ControlMessage;
use crate::input::{self, InputSource};
use crate::photodiode::PhotoDiode;
use crate::subject::ScriptedSubject;
use crate::telemetry::{FrameRecord, TelemetryRecord, TelemetrySink};

/// Controller for the configured tracker kind. Kinds without a driver in this build get
/// an inert controller. The simulated kinds come with a scripted subject feeding them.
pub fn controller_for(
    tracker: &TrackerConfig,
) -> (Option<Box<dyn EyeController>>, Option<ScriptedSubject>) {
    match tracker.kind {
        TrackerKind::None => (None, None),
        TrackerKind::Eyelink | TrackerKind::Tobii => (
            Some(Box::new(UnsupportedController::new(tracker.kind.as_str()))),
            None,
        ),
        TrackerKind::SimRaw => {
            let link = SimulatedLink::new(3, Duration::from_millis(5));
            let (raw, feed) = SimulatedRawTracker::new(link.clone(), TrackedEye::Left);
            let controller = RawTrackerController::new(raw, link.probe_factory(), tracker.watchdog);
            (Some(Box::new(controller)), Some(ScriptedSubject::raw(feed)))
        }
        TrackerKind::SimDisplay => {
            let (display, feed) = SimulatedDisplayTracker::channel();
            let controller = DisplayTrackerController::new(display, tracker.eye.unwrap_or_default());
            (Some(Box::new(controller)), Some(ScriptedSubject::display(feed)))
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub timestamp_ns: u64,
    pub phase: TrialPhase,
    /// Phase entered during this step.
    pub transition: Option<TrialPhase>,
    pub gaze: Option<GazeUpdate>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionReport {
    pub frames: u64,
    pub final_phase: TrialPhase,
    pub results: Vec<TrialSummary>,
}

pub struct Session<T: Timer, S: Scene> {
    config: SessionConfig,
    timer: T,
    scene: S,
    model: CalibrationModel,
    gaze: GazeProcessor,
    machine: TrialStateMachine,
    registry: ObjectRegistry,
    eye: Option<Box<dyn EyeController>>,
    subject: Option<ScriptedSubject>,
    input: Box<dyn InputSource>,
    photodiode: PhotoDiode<StdRng>,
    telemetry: Option<Box<dyn TelemetrySink>>,
    control_bus: EventBus<ControlMessage>,
    control: Subscription<ControlMessage>,
    pending: VecDeque<ControlMessage>,
    events: Subscription<ExperimentEvent>,
    frames: u64,
}

impl<T: Timer, S: Scene> Session<T, S> {
    /// Generates the trial list and wires the pipeline described by `config`.
    pub fn new(config: SessionConfig, timer: T, scene: S) -> Result<Self> {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut registry = ObjectRegistry::new();
        let trials = TrialGenerator::new(&config.task, config.display).generate(&mut registry, &mut rng);

        let bus = EventBus::new();
        let events = bus.subscribe();
        let mut machine = TrialStateMachine::new(config.task.clone(), bus);
        machine.load_trials(trials).context("loading generated trials")?;

        let mut gaze = GazeProcessor::new();
        if let Some(deg) = config.tracker.gaze_radius_deg {
            gaze.set_gaze_window(deg);
        }

        let control_bus = EventBus::new();
        let control = control_bus.subscribe();
        let (eye, subject) = controller_for(&config.tracker);

        info!(
            "session ready: {} trials, {} objects, tracker {}, {:.1} Hz",
            machine.remaining_trials(),
            registry.len(),
            config.tracker.kind.as_str(),
            config.frame_rate_hz
        );

        Ok(Self {
            model: CalibrationModel::new(config.display),
            eye,
            subject,
            input: input::from_config(&config.input),
            photodiode: PhotoDiode::new(StdRng::seed_from_u64(rng.random())),
            config,
            timer,
            scene,
            gaze,
            machine,
            registry,
            telemetry: None,
            control_bus,
            control,
            pending: VecDeque::new(),
            events,
            frames: 0,
        })
    }

    /// Replaces the tracker. A scripted subject feeding the old one goes with it.
    pub fn with_eye_controller(mut self, controller: Box<dyn EyeController>) -> Self {
        self.subject = None;
        if let Some(mut old) = self.eye.replace(controller) {
            old.shutdown();
        }
        self
    }

    pub fn with_input(mut self, input: Box<dyn InputSource>) -> Self {
        self.input = input;
        self
    }

    /// Attaches a sink and writes the session metadata to it.
    pub fn with_telemetry(mut self, sink: Box<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(sink);
        let table = self.config.telemetry.phase_table;
        self.record(TelemetryRecord::Metadata {
            tracker: self.config.tracker.kind,
            display: self.config.display,
            phase_table: table,
            phases: table.entries().collect(),
            objects: self
                .registry
                .entries()
                .map(|(id, name)| (id, name.to_string()))
                .collect(),
        });
        self
    }

    /// Publisher side of the control channel.
    pub fn control_bus(&self) -> EventBus<ControlMessage> {
        self.control_bus.clone()
    }

    /// Applies a calibration to the model and the gaze processor. A rejected set keeps
    /// the previous one.
    pub fn apply_calibration(&mut self, mut params: CalibrationParameters) -> bool {
        if let Some(eye) = self.config.tracker.eye {
            params.tracked_eye = eye;
        }
        if let Err(e) = self.model.apply_calibration(params.clone()) {
            warn!("calibration rejected: {}", e);
            return false;
        }
        self.gaze.update_calibration(&params);
        let timestamp_ns = self.timer.now();
        self.record(TelemetryRecord::Calibration {
            timestamp_ns,
            parameters: params,
        });
        true
    }

    pub fn step(&mut self) -> StepReport {
        let now = self.timer.now();

        if let Some(subject) = &mut self.subject {
            subject.look(&self.machine, &self.model, self.config.frame_period_ns() / 1_000);
        }
        let tick = match &mut self.eye {
            Some(eye) => eye.tick(&self.model, &mut self.gaze, now),
            None => EyeTick::default(),
        };

        // at most one transition per step; later commands wait for the next one
        self.pending.extend(self.control.drain());
        let mut transition = None;
        while transition.is_none() {
            let Some(message) = self.pending.pop_front() else {
                break;
            };
            match message {
                ControlMessage::Calibration(params) => {
                    self.apply_calibration(params);
                }
                ControlMessage::Command(command) => {
                    let mut ctx = PhaseContext {
                        now_ns: now,
                        gaze: &mut self.gaze,
                        scene: &mut self.scene,
                    };
                    transition = self.machine.handle_command(command, &mut ctx);
                }
            }
        }

        let axes = self.input.read_axes();
        if transition.is_none() {
            let mut ctx = PhaseContext {
                now_ns: now,
                gaze: &mut self.gaze,
                scene: &mut self.scene,
            };
            transition = self.machine.tick(&mut ctx, axes);
        }

        self.forward_events();

        let phase = self.machine.phase();
        let frame = FrameRecord::new(
            now,
            self.scene.pose(),
            tick.update.as_ref().map(|u| u.device),
            self.config.telemetry.phase_table.encode_or_null(phase),
            self.photodiode.next(),
            self.machine.current_trial().map_or(0, |t| t.trial_number),
        );
        self.record(TelemetryRecord::Frame(frame));
        if !tick.samples.is_empty() {
            self.record(TelemetryRecord::Samples {
                timestamp_ns: now,
                rows: tick.samples,
            });
        }

        self.frames += 1;
        StepReport {
            timestamp_ns: now,
            phase,
            transition,
            gaze: tick.update,
        }
    }

    /// Runs frames at the configured rate until the machine reaches Null or `max_frames`
    /// have been stepped.
    pub fn run(&mut self, max_frames: Option<u64>) -> SessionReport {
        let period = Duration::from_nanos(self.config.frame_period_ns());
        info!("session running at {:?} per frame", period);

        while self.machine.phase() != TrialPhase::Null {
            if max_frames.is_some_and(|max| self.frames >= max) {
                info!("frame limit reached");
                break;
            }
            let start = self.timer.now();
            self.step();
            if let Some(rest) = period.checked_sub(self.timer.elapsed(start)) {
                self.timer.sleep(rest);
            }
            let frame_time = self.timer.elapsed(start);
            self.timer.record_frame(frame_time);
        }
        self.finish()
    }

    /// Releases the tracker and flushes telemetry.
    pub fn finish(&mut self) -> SessionReport {
        if let Some(eye) = &mut self.eye {
            eye.shutdown();
        }
        if let Some(sink) = &mut self.telemetry {
            if let Err(e) = sink.flush() {
                warn!("telemetry flush failed: {:#}", e);
            }
        }

        let stats = self.timer.timing_stats();
        if stats.frames > 0 {
            info!(
                "{} frames, {:.1} fps, mean {:.3} ms, jitter {:.3} ms",
                stats.frames,
                stats.effective_fps,
                stats.average_frame_time_ns / 1e6,
                stats.jitter_ns / 1e6
            );
        }
        info!(
            "session finished in {} after {} trials",
            self.machine.phase(),
            self.machine.results().len()
        );
        SessionReport {
            frames: self.frames,
            final_phase: self.machine.phase(),
            results: self.machine.results().to_vec(),
        }
    }

    fn forward_events(&mut self) {
        for event in self.events.drain() {
            match event {
                ExperimentEvent::PhaseChanged { from, to, at_ns } => {
                    debug!("{} -> {} at {} ns", from, to, at_ns);
                }
                ExperimentEvent::TrialBound(parameters) => {
                    self.record(TelemetryRecord::Trial {
                        timestamp_ns: self.timer.now(),
                        parameters,
                    });
                }
                ExperimentEvent::TrialCompleted(summary) => {
                    self.record(TelemetryRecord::Summary {
                        timestamp_ns: summary.timestamp_ns,
                        text: summary.outcome.as_str().to_string(),
                        summary: Some(summary),
                    });
                }
            }
        }
    }

    fn record(&mut self, record: TelemetryRecord) {
        if let Some(sink) = &mut self.telemetry {
            if let Err(e) = sink.write(&record) {
                warn!("telemetry write failed: {:#}", e);
            }
        }
    }

    pub fn phase(&self) -> TrialPhase {
        self.machine.phase()
    }

    pub fn machine(&self) -> &TrialStateMachine {
        &self.machine
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn gaze(&self) -> &GazeProcessor {
        &self.gaze
    }

    pub fn model(&self) -> &CalibrationModel {
        &self.model
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.registry
    }

    pub fn timer(&self) -> &T {
        &self.timer
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}
