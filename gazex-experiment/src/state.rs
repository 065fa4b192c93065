//! Trial phase state machine.
//!
//! Exactly one [`TrialPhase`] is active. Transitions come from [`next_phase`], a pure
//! function of the current phase and one [`TrialEvent`]; the side effects of entering and
//! leaving a phase live in a lookup table indexed by phase ordinal. The old phase's
//! exit handler always completes before the new phase's entry handler runs.

use std::collections::VecDeque;

use gazex_core::{
    Command, EventBus, ObjectId, ObjectKind, PhaseCodeTable, RewardTier, TrialObject,
    TrialOutcome, TrialParameters, TrialPhase, TrialSummary, Vec2,
};
use gazex_eye::GazeProcessor;
use gazex_timing::Timer;
use tracing::{debug, info, warn};

use crate::config::TaskConfig;
use crate::error::ExperimentError;
use crate::scene::Scene;

/// Published on the experiment bus.
#[derive(Debug, Clone, PartialEq)]
pub enum ExperimentEvent {
    PhaseChanged {
        from: TrialPhase,
        to: TrialPhase,
        at_ns: u64,
    },
    /// Parameters of the trial just bound at ITI entry.
    TrialBound(TrialParameters),
    TrialCompleted(TrialSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrialEvent {
    Command(Command),
    TimerElapsed,
    /// ITI timer expired with no trial bound.
    TrialsExhausted,
    FixationAcquired,
    TargetChosen(ObjectId),
    DistractorChosen(ObjectId),
    ResponseTimeout,
    /// Max trial time used up.
    TrialTimeout,
}

/// Transition function. Pairs not listed leave the phase unchanged; Null is terminal.
pub fn next_phase(phase: TrialPhase, event: TrialEvent, reward: RewardTier) -> TrialPhase {
    use TrialEvent as E;
    use TrialPhase as P;

    let running = !matches!(phase, P::Setup | P::Pause | P::Null);
    match (phase, event) {
        (P::Null, _) => P::Null,
        (_, E::Command(Command::End)) => P::Null,
        (P::Setup, E::Command(Command::Begin)) => P::Iti,
        (_, E::Command(Command::Pause)) if running => P::Pause,
        (P::Pause, E::Command(Command::Resume)) => P::Resume,

        (P::Iti, E::TimerElapsed) => P::StartOfTrial,
        (P::Iti, E::TrialsExhausted) => P::Pause,
        (p, E::TrialTimeout) if p.is_in_trial() => P::EndOfTrial,
        (P::StartOfTrial, E::FixationAcquired) => P::Delay1,
        (P::Delay1, E::TimerElapsed) => P::Cue,
        (P::Cue, E::TimerElapsed) => P::Delay2,
        (P::Delay2, E::TimerElapsed) => P::Distractor,
        (P::Distractor, E::TimerElapsed) => P::Delay3,
        (P::Delay3, E::TimerElapsed) => P::ForceFov,
        (P::ForceFov, E::TimerElapsed) => P::Target,
        (P::Target, E::TimerElapsed) => P::Response,
        (P::Response, E::TargetChosen(_) | E::DistractorChosen(_) | E::ResponseTimeout) => {
            P::EndOfTrial
        }
        (P::EndOfTrial, E::TimerElapsed) => P::Feedback,
        (P::Feedback, E::TimerElapsed) => P::for_reward(reward),
        (p, E::TimerElapsed) if p.reward_tier().is_some() => P::Iti,
        (P::Resume, E::TimerElapsed) => P::Iti,
        (p, _) => p,
    }
}

/// Frame-loop state handed to the machine for one tick.
pub struct PhaseContext<'a> {
    pub now_ns: u64,
    pub gaze: &'a mut GazeProcessor,
    pub scene: &'a mut dyn Scene,
}

impl<'a> PhaseContext<'a> {
    pub fn new<T: Timer>(timer: &T, gaze: &'a mut GazeProcessor, scene: &'a mut dyn Scene) -> Self {
        Self {
            now_ns: timer.now(),
            gaze,
            scene,
        }
    }
}

type Hook = fn(&mut TrialStateMachine, &mut PhaseContext<'_>);

#[derive(Clone, Copy)]
struct PhaseHandlers {
    on_enter: Hook,
    on_exit: Hook,
}

const fn on(on_enter: Hook, on_exit: Hook) -> PhaseHandlers {
    PhaseHandlers { on_enter, on_exit }
}

const NONE: PhaseHandlers = on(noop, noop);
const REWARD: PhaseHandlers = on(enter_reward, noop);

/// Indexed by [`TrialPhase::ordinal`].
static HANDLERS: [PhaseHandlers; TrialPhase::ALL.len()] = [
    on(enter_iti, noop),                           // ITI
    on(enter_start_of_trial, exit_start_of_trial), // StartOfTrial
    NONE,                                          // Delay_1
    on(enter_cue, exit_cue),                       // Cue
    NONE,                                          // Delay_2
    on(enter_distractor, noop),                    // Distractor
    NONE,                                          // Delay_3
    NONE,                                          // ForceFOV
    on(enter_target, noop),                        // Target
    on(enter_response, noop),                      // Response
    on(enter_end_of_trial, noop),                  // EndOfTrial
    on(enter_feedback, noop),                      // Feedback
    on(enter_pause, exit_pause),                   // Pause
    NONE,                                          // Resume
    NONE,                                          // Setup
    REWARD,                                        // QuarterReward
    REWARD,                                        // HalfReward
    REWARD,                                        // ThreeQuarterReward
    REWARD,                                        // FullReward
    REWARD,                                        // NoReward
    on(enter_null, noop),                          // Null
];

fn noop(_: &mut TrialStateMachine, _: &mut PhaseContext<'_>) {}

fn clear_stage(ctx: &mut PhaseContext<'_>) {
    ctx.scene.hide_all();
    ctx.gaze.clear_windows();
}

fn activate(ctx: &mut PhaseContext<'_>, kind: ObjectKind, objects: &[TrialObject]) {
    ctx.scene.show(kind, objects);
    for w in TrialParameters::windows(objects) {
        ctx.gaze.add_window(w.clone());
    }
}

fn enter_iti(m: &mut TrialStateMachine, ctx: &mut PhaseContext<'_>) {
    clear_stage(ctx);
    m.iti_penalty_ms = match m.outcome {
        TrialOutcome::Incorrect { .. } => m.config.error_penalty_ms,
        TrialOutcome::Ignored => m.config.ignore_penalty_ms,
        _ => 0,
    };
    m.outcome = TrialOutcome::Aborted;
    m.trial_started_ns = None;
    m.response_started_ns = None;
    m.reaction_time_ns = None;
    m.distractors_shown = false;

    m.current = m.queue.pop_front();
    match &m.current {
        Some(t) => {
            info!("trial {} bound, {} queued", t.trial_number, m.queue.len());
            ctx.scene.prepare_trial(t);
            m.bus.publish(ExperimentEvent::TrialBound(t.clone()));
        }
        None => info!("no trials left"),
    }
}

fn enter_start_of_trial(m: &mut TrialStateMachine, ctx: &mut PhaseContext<'_>) {
    m.trial_started_ns = Some(ctx.now_ns);
    m.in_trial = true;
    ctx.gaze.reset_dwell();
    if let Some(t) = &m.current {
        for w in &t.fixations {
            ctx.gaze.add_window(w.clone());
        }
    }
}

fn exit_start_of_trial(_: &mut TrialStateMachine, ctx: &mut PhaseContext<'_>) {
    ctx.gaze.remove_kind(ObjectKind::Fixation);
}

fn enter_cue(m: &mut TrialStateMachine, ctx: &mut PhaseContext<'_>) {
    if let Some(t) = &m.current {
        activate(ctx, ObjectKind::Cue, &t.cues);
    }
    ctx.scene.freeze_input(true);
}

fn exit_cue(_: &mut TrialStateMachine, ctx: &mut PhaseContext<'_>) {
    ctx.scene.hide(ObjectKind::Cue);
    ctx.gaze.remove_kind(ObjectKind::Cue);
    ctx.scene.freeze_input(false);
}

fn show_distractors(m: &mut TrialStateMachine, ctx: &mut PhaseContext<'_>) {
    if m.distractors_shown {
        return;
    }
    if let Some(t) = &m.current {
        activate(ctx, ObjectKind::Distractor, &t.distractors);
    }
    m.distractors_shown = true;
}

fn enter_distractor(m: &mut TrialStateMachine, ctx: &mut PhaseContext<'_>) {
    show_distractors(m, ctx);
}

fn enter_target(m: &mut TrialStateMachine, ctx: &mut PhaseContext<'_>) {
    if let Some(t) = &m.current {
        activate(ctx, ObjectKind::Target, &t.targets);
    }
    show_distractors(m, ctx);
}

fn enter_response(m: &mut TrialStateMachine, ctx: &mut PhaseContext<'_>) {
    m.response_started_ns = Some(ctx.now_ns);
}

fn enter_end_of_trial(m: &mut TrialStateMachine, ctx: &mut PhaseContext<'_>) {
    clear_stage(ctx);
    m.summarise(ctx.now_ns);
}

fn enter_feedback(m: &mut TrialStateMachine, ctx: &mut PhaseContext<'_>) {
    ctx.scene.report_outcome(m.outcome);
}

fn enter_reward(m: &mut TrialStateMachine, ctx: &mut PhaseContext<'_>) {
    if let Some(tier) = m.phase.reward_tier() {
        ctx.scene.deliver_reward(tier);
    }
}

fn enter_pause(m: &mut TrialStateMachine, ctx: &mut PhaseContext<'_>) {
    clear_stage(ctx);
    ctx.scene.freeze_input(true);
    m.abort(ctx.now_ns);
}

fn exit_pause(_: &mut TrialStateMachine, ctx: &mut PhaseContext<'_>) {
    ctx.scene.freeze_input(false);
}

fn enter_null(m: &mut TrialStateMachine, ctx: &mut PhaseContext<'_>) {
    clear_stage(ctx);
    ctx.scene.freeze_input(true);
    m.abort(ctx.now_ns);
}

pub struct TrialStateMachine {
    config: TaskConfig,
    bus: EventBus<ExperimentEvent>,
    phase: TrialPhase,
    entered_ns: u64,
    queue: VecDeque<TrialParameters>,
    current: Option<TrialParameters>,
    outcome: TrialOutcome,
    /// A trial has started and has not been summarised yet.
    in_trial: bool,
    trial_started_ns: Option<u64>,
    response_started_ns: Option<u64>,
    reaction_time_ns: Option<u64>,
    iti_penalty_ms: u64,
    distractors_shown: bool,
    results: Vec<TrialSummary>,
}

impl TrialStateMachine {
    pub fn new(config: TaskConfig, bus: EventBus<ExperimentEvent>) -> Self {
        Self {
            config,
            bus,
            phase: TrialPhase::Setup,
            entered_ns: 0,
            queue: VecDeque::new(),
            current: None,
            outcome: TrialOutcome::Aborted,
            in_trial: false,
            trial_started_ns: None,
            response_started_ns: None,
            reaction_time_ns: None,
            iti_penalty_ms: 0,
            distractors_shown: false,
            results: Vec::new(),
        }
    }

    /// Replaces the trial queue. Only allowed while nothing is running.
    pub fn load_trials(&mut self, trials: Vec<TrialParameters>) -> Result<(), ExperimentError> {
        if !matches!(self.phase, TrialPhase::Setup | TrialPhase::Pause) {
            warn!("wait for the experiment to be paused before loading trials");
            return Err(ExperimentError::TrialsLocked(self.phase));
        }
        info!("{} trials loaded", trials.len());
        self.queue = trials.into();
        Ok(())
    }

    pub fn handle_command(&mut self, command: Command, ctx: &mut PhaseContext<'_>) -> Option<TrialPhase> {
        info!("command {} in {}", command, self.phase);
        self.fire(TrialEvent::Command(command), ctx)
    }

    /// Advances time-, dwell- and input-driven transitions. At most one transition per
    /// tick; returns the phase entered, if any.
    pub fn tick(&mut self, ctx: &mut PhaseContext<'_>, joystick: Vec2) -> Option<TrialPhase> {
        let event = self.poll(ctx, joystick)?;
        self.fire(event, ctx)
    }

    /// Playback entry point: jumps straight to `phase`, running the same exit and entry
    /// handlers a live transition would.
    pub fn set_phase(&mut self, phase: TrialPhase, ctx: &mut PhaseContext<'_>) -> bool {
        if phase == self.phase {
            return false;
        }
        if phase == TrialPhase::EndOfTrial && self.phase.is_in_trial() {
            let choice = self
                .response_choice(ctx.gaze)
                .unwrap_or(TrialEvent::ResponseTimeout);
            self.resolve(choice, ctx.now_ns);
        }
        self.transition(phase, ctx);
        true
    }

    /// Decodes a recorded phase code and applies it. Unknown codes change nothing.
    pub fn apply_phase_code(
        &mut self,
        table: PhaseCodeTable,
        code: i64,
        ctx: &mut PhaseContext<'_>,
    ) -> Result<bool, ExperimentError> {
        let phase = table
            .decode(code)
            .ok_or(ExperimentError::UnknownPhaseCode { code, table })?;
        Ok(self.set_phase(phase, ctx))
    }

    pub fn phase(&self) -> TrialPhase {
        self.phase
    }

    pub fn outcome(&self) -> TrialOutcome {
        self.outcome
    }

    pub fn current_trial(&self) -> Option<&TrialParameters> {
        self.current.as_ref()
    }

    pub fn remaining_trials(&self) -> usize {
        self.queue.len()
    }

    pub fn results(&self) -> &[TrialSummary] {
        &self.results
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    /// Reward tier the current outcome earns.
    pub fn pending_reward(&self) -> RewardTier {
        match (self.outcome, &self.current) {
            (TrialOutcome::Correct { target }, Some(t)) => t
                .target_index(target)
                .map_or(RewardTier::Full, |i| self.config.reward_for(i)),
            (TrialOutcome::Correct { .. }, None) => RewardTier::Full,
            _ => RewardTier::None,
        }
    }

    fn fire(&mut self, event: TrialEvent, ctx: &mut PhaseContext<'_>) -> Option<TrialPhase> {
        let next = next_phase(self.phase, event, self.pending_reward());
        if next == self.phase {
            return None;
        }
        self.resolve(event, ctx.now_ns);
        self.transition(next, ctx);
        Some(next)
    }

    fn resolve(&mut self, event: TrialEvent, now_ns: u64) {
        let reaction = self.response_started_ns.map(|s| now_ns.saturating_sub(s));
        match event {
            TrialEvent::TargetChosen(target) => {
                self.outcome = TrialOutcome::Correct { target };
                self.reaction_time_ns = reaction;
            }
            TrialEvent::DistractorChosen(distractor) => {
                self.outcome = TrialOutcome::Incorrect { distractor };
                self.reaction_time_ns = reaction;
            }
            TrialEvent::ResponseTimeout | TrialEvent::TrialTimeout => {
                self.outcome = TrialOutcome::Ignored;
            }
            _ => {}
        }
    }

    fn transition(&mut self, next: TrialPhase, ctx: &mut PhaseContext<'_>) {
        let from = self.phase;
        (HANDLERS[from.ordinal()].on_exit)(self, ctx);
        self.phase = next;
        self.entered_ns = ctx.now_ns;
        debug!("phase {} -> {}", from, next);
        self.bus.publish(ExperimentEvent::PhaseChanged {
            from,
            to: next,
            at_ns: ctx.now_ns,
        });
        (HANDLERS[next.ordinal()].on_enter)(self, ctx);
    }

    fn poll(&self, ctx: &PhaseContext<'_>, joystick: Vec2) -> Option<TrialEvent> {
        use TrialPhase as P;

        let now = ctx.now_ns;
        let c = &self.config;
        let t = &c.timings;
        let elapsed = |ms: u64| now.saturating_sub(self.entered_ns) >= ms * 1_000_000;
        let timer = |ms: u64| elapsed(ms).then_some(TrialEvent::TimerElapsed);

        if self.phase.is_in_trial() && c.max_trial_time_ms > 0 {
            if let Some(start) = self.trial_started_ns {
                if now.saturating_sub(start) >= c.max_trial_time_ms * 1_000_000 {
                    return Some(TrialEvent::TrialTimeout);
                }
            }
        }

        match self.phase {
            P::Iti => {
                if c.joystick_blocking && joystick.norm() > c.joystick_deadzone {
                    return None;
                }
                let duration = if c.continuous_trials {
                    0
                } else {
                    t.iti_ms + self.iti_penalty_ms
                };
                timer(duration)?;
                Some(match self.current {
                    Some(_) => TrialEvent::TimerElapsed,
                    None => TrialEvent::TrialsExhausted,
                })
            }
            P::StartOfTrial => {
                let fixations = self.current.as_ref().map_or(0, |t| t.fixations.len());
                if fixations == 0 || c.fixation_dwell == 0 {
                    return timer(t.start_of_trial_ms).map(|_| TrialEvent::FixationAcquired);
                }
                let (_, dwell) = ctx.gaze.leader(ObjectKind::Fixation)?;
                (dwell >= c.fixation_dwell).then_some(TrialEvent::FixationAcquired)
            }
            P::Delay1 => timer(t.delay_1_ms),
            P::Cue => timer(t.cue_ms),
            P::Delay2 => timer(t.delay_2_ms),
            P::Distractor => timer(t.distractor_ms),
            P::Delay3 => timer(t.delay_3_ms),
            P::ForceFov => timer(t.force_fov_ms),
            P::Target => timer(t.target_ms),
            P::Response => self
                .response_choice(ctx.gaze)
                .or_else(|| elapsed(c.response_time_ms).then_some(TrialEvent::ResponseTimeout)),
            P::EndOfTrial => timer(t.end_of_trial_ms),
            P::Feedback => timer(t.feedback_ms),
            P::QuarterReward
            | P::HalfReward
            | P::ThreeQuarterReward
            | P::FullReward
            | P::NoReward => timer(t.reward_ms),
            P::Resume => timer(t.resume_ms),
            P::Setup | P::Pause | P::Null => None,
        }
    }

    /// A target or distractor whose dwell reached the response criterion. Targets are
    /// checked first.
    fn response_choice(&self, gaze: &GazeProcessor) -> Option<TrialEvent> {
        let criterion = self.config.response_dwell.max(1);
        let reached = |kind| gaze.leader(kind).filter(|(_, dwell)| *dwell >= criterion);
        reached(ObjectKind::Target)
            .map(|(id, _)| TrialEvent::TargetChosen(id))
            .or_else(|| reached(ObjectKind::Distractor).map(|(id, _)| TrialEvent::DistractorChosen(id)))
    }

    fn abort(&mut self, now_ns: u64) {
        if self.in_trial {
            self.outcome = TrialOutcome::Aborted;
            self.summarise(now_ns);
        } else if self.trial_started_ns.is_none() {
            // bound in ITI but never started: run it again after resume
            if let Some(t) = self.current.take() {
                debug!("trial {} requeued", t.trial_number);
                self.queue.push_front(t);
            }
        }
    }

    fn summarise(&mut self, now_ns: u64) {
        if !self.in_trial {
            return;
        }
        self.in_trial = false;
        let summary = TrialSummary {
            trial_number: self.current.as_ref().map_or(0, |t| t.trial_number),
            outcome: self.outcome,
            reward: self.pending_reward(),
            reaction_time_ns: self.reaction_time_ns,
            timestamp_ns: now_ns,
        };
        info!(
            "trial {} {} reward {:?}",
            summary.trial_number,
            summary.outcome.as_str(),
            summary.reward
        );
        self.results.push(summary.clone());
        self.bus.publish(ExperimentEvent::TrialCompleted(summary));
    }
}
