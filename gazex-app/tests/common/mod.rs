use std::path::Path;
use std::time::Duration;

use gazex_app::{JsonLinesTelemetry, Session, SessionConfig, SessionReport, StepReport, TrackerKind};
use gazex_core::{Command, TrialPhase, Vec2};
use gazex_experiment::{HeadlessScene, PhaseTimings, TrialStateMachine};
use gazex_eye::{BinocularSample, DisplayTrackerController, EyeSample, Resolution, SimulatedDisplayTracker, TrackedEye};
use gazex_timing::ManualTimer;

pub fn config() -> SessionConfig {
    let mut c = SessionConfig {
        seed: Some(3),
        frame_rate_hz: 100.0,
        ..Default::default()
    };
    c.tracker.kind = TrackerKind::SimDisplay;
    c.tracker.eye = Some(TrackedEye::Binocular);
    c.task.number_of_sets = 2;
    c.task.continuous_trials = false;
    c.task.fixation_dwell = 3;
    c.task.response_dwell = 3;
    c.task.timings = PhaseTimings {
        iti_ms: 50,
        delay_1_ms: 20,
        cue_ms: 30,
        delay_2_ms: 20,
        delay_3_ms: 20,
        feedback_ms: 20,
        reward_ms: 20,
        ..Default::default()
    };
    c.validated().unwrap()
}

/// Both eyes on `pixel`, in display coordinates.
pub fn sample_at(pixel: Vec2, display: Resolution) -> BinocularSample {
    let res = display.as_vec();
    let eye = EyeSample {
        x: pixel.x / res.x,
        y: 1.0 - pixel.y / res.y,
        pupil: 3.0,
        valid: true,
    };
    BinocularSample {
        left: eye,
        right: eye,
        device_time_us: 0,
    }
}

/// A subject that fixates when asked and picks the target on odd trials, a distractor
/// on even ones.
pub fn look_at(machine: &TrialStateMachine) -> Vec2 {
    let away = Vec2::new(5.0, 5.0);
    let Some(trial) = machine.current_trial() else {
        return away;
    };
    let choice = if trial.trial_number % 2 == 1 {
        &trial.targets[0]
    } else {
        &trial.distractors[0]
    };
    match machine.phase() {
        TrialPhase::StartOfTrial => trial.fixations[0].position,
        TrialPhase::Target | TrialPhase::Response => {
            choice.window.as_ref().map_or(away, |w| w.position)
        }
        _ => away,
    }
}

/// Frame on which the tracker reports a NaN gaze point.
pub const GLITCH_FRAME: usize = 3;

pub struct Recorded {
    pub steps: Vec<StepReport>,
    pub report: SessionReport,
    pub scene: HeadlessScene,
}

/// Runs every generated trial with the scripted subject, then ends the session.
pub fn record_session(config: SessionConfig, telemetry: &Path) -> Recorded {
    let timer = ManualTimer::new();
    let display = config.display;
    let (tracker, feed) = SimulatedDisplayTracker::channel();
    let mut session = Session::new(config, timer.clone(), HeadlessScene::new())
        .unwrap()
        .with_eye_controller(Box::new(DisplayTrackerController::new(
            tracker,
            TrackedEye::Binocular,
        )))
        .with_telemetry(Box::new(JsonLinesTelemetry::create(telemetry).unwrap()));

    let control = session.control_bus();
    control.publish(gazex_app::ControlMessage::Command(Command::Begin));

    let mut steps = Vec::new();
    for frame in 0..5000 {
        let target = if frame == GLITCH_FRAME {
            Vec2::new(f32::NAN, 5.0)
        } else {
            look_at(session.machine())
        };
        feed.send(sample_at(target, display)).unwrap();
        steps.push(session.step());
        timer.advance(Duration::from_millis(10));
        if session.phase() == TrialPhase::Pause {
            break;
        }
    }
    assert_eq!(session.phase(), TrialPhase::Pause, "trials never ran out");

    control.publish(gazex_app::ControlMessage::Command(Command::End));
    steps.push(session.step());
    let report = session.finish();
    Recorded {
        steps,
        report,
        scene: session.scene().clone(),
    }
}
