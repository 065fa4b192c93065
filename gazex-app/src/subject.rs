//! A scripted observer for the simulated trackers: fixates when a fixation point is up
//! and looks at the first target once targets appear.

use crossbeam_channel::Sender;
use gazex_core::{TrialPhase, Vec2};
use gazex_experiment::TrialStateMachine;
use gazex_eye::{BinocularSample, CalibrationModel, EyeSample, TransducerSample};
use tracing::debug;

/// Where the observer looks, in screen pixels (origin bottom-left). Screen centre when
/// nothing asks for attention.
pub fn gaze_goal(machine: &TrialStateMachine, model: &CalibrationModel) -> Vec2 {
    let centre = model.display().as_vec() * 0.5;
    let Some(trial) = machine.current_trial() else {
        return centre;
    };
    let goal = match machine.phase() {
        TrialPhase::StartOfTrial => trial.fixations.first().map(|w| w.position),
        TrialPhase::Target | TrialPhase::Response => trial
            .targets
            .first()
            .and_then(|t| t.window.as_ref())
            .map(|w| w.position),
        _ => None,
    };
    goal.unwrap_or(centre)
}

enum Feed {
    Display(Sender<BinocularSample>),
    Raw(Sender<TransducerSample>),
}

pub struct ScriptedSubject {
    feed: Feed,
    clock_us: u64,
}

impl ScriptedSubject {
    pub fn display(feed: Sender<BinocularSample>) -> Self {
        Self {
            feed: Feed::Display(feed),
            clock_us: 0,
        }
    }

    /// Raw counts are found by inverting the active calibration, so nothing is sent
    /// until one is applied.
    pub fn raw(feed: Sender<TransducerSample>) -> Self {
        Self {
            feed: Feed::Raw(feed),
            clock_us: 0,
        }
    }

    /// Emits one sample aimed at the current goal.
    pub fn look(&mut self, machine: &TrialStateMachine, model: &CalibrationModel, frame_us: u64) {
        self.clock_us += frame_us.max(1);
        let goal = gaze_goal(machine, model);
        let sent = match &self.feed {
            Feed::Display(tx) => {
                let res = model.display().as_vec();
                let eye = EyeSample {
                    x: goal.x / res.x,
                    y: 1.0 - goal.y / res.y,
                    pupil: 3.0,
                    valid: true,
                };
                tx.send(BinocularSample {
                    left: eye,
                    right: eye,
                    device_time_us: self.clock_us,
                })
                .is_ok()
            }
            Feed::Raw(tx) => match model.pixels_to_raw(goal) {
                Some(counts) => tx
                    .send(TransducerSample {
                        time: self.clock_us,
                        left: counts,
                        right: counts,
                    })
                    .is_ok(),
                None => true,
            },
        };
        if !sent {
            debug!("simulated tracker is gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use gazex_core::{Command, EventBus};
    use gazex_experiment::{HeadlessScene, PhaseContext, TaskConfig, TrialGenerator};
    use gazex_eye::{CalibrationParameters, GazeProcessor, Resolution};
    use gazex_cache::ObjectRegistry;
    use gazex_timing::ManualTimer;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn machine() -> TrialStateMachine {
        let task = TaskConfig::default();
        let mut registry = ObjectRegistry::new();
        let trials = TrialGenerator::new(&task, Resolution::default())
            .generate(&mut registry, &mut StdRng::seed_from_u64(1));
        let mut m = TrialStateMachine::new(task, EventBus::new());
        m.load_trials(trials).unwrap();
        m
    }

    #[test]
    fn idle_observer_looks_at_the_centre() {
        let (tx, rx) = unbounded();
        let mut subject = ScriptedSubject::display(tx);
        let model = CalibrationModel::new(Resolution::new(1000, 800));
        subject.look(&machine(), &model, 10_000);
        subject.look(&machine(), &model, 10_000);
        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(got.len(), 2);
        assert_eq!((got[0].left.x, got[0].left.y), (0.5, 0.5));
        assert_eq!(got[1].device_time_us, 20_000);
    }

    #[test]
    fn fixation_point_in_start_of_trial() {
        let mut m = machine();
        let timer = ManualTimer::new();
        let mut gaze = GazeProcessor::new();
        let mut scene = HeadlessScene::new();
        let model = CalibrationModel::new(Resolution::default());
        let mut ctx = PhaseContext::new(&timer, &mut gaze, &mut scene);
        m.handle_command(Command::Begin, &mut ctx);
        assert!(m.set_phase(TrialPhase::StartOfTrial, &mut ctx));
        let fixation = m.current_trial().unwrap().fixations[0].position;
        assert_eq!(gaze_goal(&m, &model), fixation);
    }

    #[test]
    fn raw_feed_waits_for_a_calibration() {
        let (tx, rx) = unbounded();
        let mut subject = ScriptedSubject::raw(tx);
        let mut model = CalibrationModel::new(Resolution::default());
        subject.look(&machine(), &model, 10_000);
        assert!(rx.try_recv().is_err());

        model.apply_calibration(CalibrationParameters::default()).unwrap();
        subject.look(&machine(), &model, 10_000);
        let s = rx.try_recv().unwrap();
        assert_eq!(model.raw_to_pixels(s.left).pixels, Vec2::new(960.0, 540.0));
    }
}
