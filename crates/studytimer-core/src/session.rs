//! Session lifecycle orchestration.
//!
//! The [`Orchestrator`] drives the phase sequence Action(1) ->
//! Break(1) -> ... -> Action(N) -> Break(N) -> Complete and turns
//! engine completions into [`Effect`] requests. It performs no I/O
//! itself: the driver executes the effects, and a failed persistence
//! effect is advisory only. The local phase transition and snapshot
//! write always come first, so remote failures can never stall or
//! revert the timer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::{RestoreError, ValidationError};
use crate::events::Event;
use crate::restore::{restore_remote, SessionResumeState};
use crate::storage::{HistoryEntryNew, SessionPatch, SessionStatus};
use crate::timer::{Phase, TimerEngine, TimerState, TimerStatus};

const MIN_LABEL_LEN: usize = 2;
const MAX_MINUTES: u32 = 120;
const MAX_REPETITIONS: u32 = 50;

/// User-supplied session setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub subject: String,
    pub lesson: String,
    pub action_min: u32,
    pub break_min: u32,
    pub repetitions: u32,
}

impl SessionConfig {
    /// Field-level validation, performed before any engine or
    /// persistence interaction. A rejected setup never creates a
    /// partial session.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in [("subject", &self.subject), ("lesson", &self.lesson)] {
            if value.trim().len() < MIN_LABEL_LEN {
                return Err(ValidationError::MissingField {
                    field: field.into(),
                    min_len: MIN_LABEL_LEN,
                });
            }
        }
        for (field, value) in [("action_min", self.action_min), ("break_min", self.break_min)] {
            if value == 0 || value > MAX_MINUTES {
                return Err(ValidationError::InvalidField {
                    field: field.into(),
                    message: format!("must be between 1 and {MAX_MINUTES} minutes"),
                });
            }
        }
        if self.repetitions == 0 || self.repetitions > MAX_REPETITIONS {
            return Err(ValidationError::InvalidField {
                field: "repetitions".into(),
                message: format!("must be between 1 and {MAX_REPETITIONS}"),
            });
        }
        Ok(())
    }

    pub fn action_ms(&self) -> u64 {
        self.action_min as u64 * 60_000
    }

    pub fn break_ms(&self) -> u64 {
        self.break_min as u64 * 60_000
    }
}

/// Audio cue requests, by transition kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioCue {
    /// Action phase finished, break begins.
    Bell,
    /// Break finished, back to work.
    Return,
    /// Whole session finished.
    Final,
}

/// Desktop-notification requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Notice {
    ActionComplete,
    BreakComplete,
    AllComplete,
}

/// Side-effect request emitted by the orchestrator.
///
/// The driver executes these in order. Snapshot effects come before
/// persistence effects for the same transition, so a crash
/// mid-persistence never loses local recoverability.
#[derive(Debug, Clone)]
pub enum Effect {
    PersistSession { session_id: i64, patch: SessionPatch },
    AppendHistory(HistoryEntryNew),
    SaveSnapshot,
    ClearSnapshot,
    PlayCue(AudioCue),
    Notify(Notice),
}

/// Drives one study session over a [`TimerEngine`].
#[derive(Debug)]
pub struct Orchestrator<C: Clock = SystemClock> {
    config: SessionConfig,
    session_id: Option<i64>,
    engine: TimerEngine<C>,
    finished: bool,
}

impl Orchestrator<SystemClock> {
    /// Validates the setup and prepares an idle orchestrator.
    /// `session_id` is absent when running without persistence.
    pub fn new(config: SessionConfig, session_id: Option<i64>) -> Result<Self, ValidationError> {
        Self::with_clock(config, session_id, SystemClock::new())
    }

    /// Rebuild from a server-reported in-progress session. The
    /// resulting engine is always paused; the user resumes explicitly.
    pub fn from_remote(resume: &SessionResumeState) -> Result<Self, RestoreError> {
        Self::from_remote_with_clock(resume, SystemClock::new())
    }
}

impl<C: Clock> Orchestrator<C> {
    pub fn with_clock(
        config: SessionConfig,
        session_id: Option<i64>,
        clock: C,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        let mut engine = TimerEngine::with_clock(clock);
        engine.set_repetitions(0, config.repetitions);
        Ok(Self {
            config,
            session_id,
            engine,
            finished: false,
        })
    }

    /// Rehydrate from a locally restored [`TimerState`]; counters and
    /// pause bookkeeping come from the state itself.
    pub fn from_local_state(
        config: SessionConfig,
        session_id: Option<i64>,
        state: TimerState,
        clock: C,
    ) -> Self {
        Self {
            config,
            session_id,
            engine: TimerEngine::from_state(state, clock),
            finished: false,
        }
    }

    pub fn from_remote_with_clock(
        resume: &SessionResumeState,
        clock: C,
    ) -> Result<Self, RestoreError> {
        let now_ms = clock.now_ms();
        let state = restore_remote(&resume.resume, now_ms)?;
        Ok(Self {
            config: SessionConfig {
                subject: resume.subject.clone(),
                lesson: resume.lesson.clone(),
                action_min: resume.action_min,
                break_min: resume.break_min,
                repetitions: resume.resume.target_repetitions.max(1),
            },
            session_id: Some(resume.session_id),
            engine: TimerEngine::from_state(state, clock),
            finished: false,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn session_id(&self) -> Option<i64> {
        self.session_id
    }

    pub fn engine(&self) -> &TimerEngine<C> {
        &self.engine
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Full state projection for status displays.
    pub fn status_event(&self) -> Event {
        self.engine.snapshot_event()
    }

    /// Start the first action phase.
    pub fn begin(&mut self) -> (Vec<Event>, Vec<Effect>) {
        let event = self.engine.start(Phase::Action, self.config.action_ms());
        (vec![event], vec![Effect::SaveSnapshot])
    }

    /// Freeze the countdown. Snapshot follows so a reload while
    /// paused restores the frozen remaining time.
    pub fn pause(&mut self) -> (Option<Event>, Vec<Effect>) {
        match self.engine.pause() {
            Some(event) => (Some(event), vec![Effect::SaveSnapshot]),
            None => (None, vec![]),
        }
    }

    /// Unfreeze the countdown.
    pub fn resume(&mut self) -> (Option<Event>, Vec<Effect>) {
        match self.engine.resume() {
            Some(event) => (Some(event), vec![Effect::SaveSnapshot]),
            None => (None, vec![]),
        }
    }

    /// Periodic re-evaluation. Returns display events plus any
    /// effects produced by a phase completion.
    pub fn tick(&mut self) -> (Vec<Event>, Vec<Effect>) {
        match self.engine.tick() {
            None => (vec![], vec![]),
            Some(tick @ Event::Tick { .. }) => (vec![tick], vec![]),
            Some(completed @ Event::PhaseCompleted { phase, at, .. }) => match phase {
                Phase::Action => self.on_action_complete(completed, at),
                Phase::Break => self.on_break_complete(completed, at),
            },
            Some(other) => (vec![other], vec![]),
        }
    }

    /// Explicit cancellation. Stops the engine without a completion
    /// event and finalizes the session exactly once; a second call is
    /// inert.
    pub fn cancel(&mut self) -> (Option<Event>, Vec<Effect>) {
        if self.finished {
            return (None, vec![]);
        }
        self.finished = true;
        self.engine.stop();

        let mut effects = vec![Effect::ClearSnapshot];
        if let Some(session_id) = self.session_id {
            effects.push(Effect::PersistSession {
                session_id,
                patch: SessionPatch {
                    status: Some(SessionStatus::Cancelled),
                    ended_at: Some(Utc::now()),
                    ..Default::default()
                },
            });
        }
        (Some(Event::SessionCancelled { at: Utc::now() }), effects)
    }

    fn on_action_complete(
        &mut self,
        completed: Event,
        at: DateTime<Utc>,
    ) -> (Vec<Event>, Vec<Effect>) {
        let focus_secs = self.config.action_min as u64 * 60;
        // The persisted count is the pre-increment repetition index;
        // it only advances when the matching break completes.
        let repetition = self.engine.repetition_index();

        let started = self.engine.start(Phase::Break, self.config.break_ms());

        let mut effects = vec![Effect::SaveSnapshot];
        if let Some(session_id) = self.session_id {
            effects.push(Effect::PersistSession {
                session_id,
                patch: SessionPatch {
                    completed_repetitions: Some(repetition),
                    focus_delta_secs: Some(focus_secs),
                    ..Default::default()
                },
            });
            effects.push(Effect::AppendHistory(HistoryEntryNew {
                session_id,
                phase: Phase::Action,
                repetition,
                started_at_epoch: at.timestamp() - focus_secs as i64,
                ended_at_epoch: Some(at.timestamp()),
                duration_secs: focus_secs,
                completed: true,
            }));
        }
        effects.push(Effect::PlayCue(AudioCue::Bell));
        effects.push(Effect::Notify(Notice::ActionComplete));

        (vec![completed, started], effects)
    }

    fn on_break_complete(
        &mut self,
        completed: Event,
        at: DateTime<Utc>,
    ) -> (Vec<Event>, Vec<Effect>) {
        let break_secs = self.config.break_min as u64 * 60;
        self.engine.increment_repetition();
        let index = self.engine.repetition_index();

        let mut events = vec![completed];
        let mut effects = Vec::new();

        // Snapshot bookkeeping precedes persistence either way: a
        // crash mid-finalization must not leave a snapshot that would
        // replay the already-recorded break.
        let session_done = index >= self.engine.target_repetitions();
        if session_done {
            self.finished = true;
            effects.push(Effect::ClearSnapshot);
        } else {
            events.push(self.engine.start(Phase::Action, self.config.action_ms()));
            effects.push(Effect::SaveSnapshot);
        }

        if let Some(session_id) = self.session_id {
            effects.push(Effect::PersistSession {
                session_id,
                patch: SessionPatch {
                    break_delta_secs: Some(break_secs),
                    ..Default::default()
                },
            });
            effects.push(Effect::AppendHistory(HistoryEntryNew {
                session_id,
                phase: Phase::Break,
                repetition: index - 1,
                started_at_epoch: at.timestamp() - break_secs as i64,
                ended_at_epoch: Some(at.timestamp()),
                duration_secs: break_secs,
                completed: true,
            }));
        }

        if session_done {
            if let Some(session_id) = self.session_id {
                effects.push(Effect::PersistSession {
                    session_id,
                    patch: SessionPatch {
                        status: Some(SessionStatus::Complete),
                        ended_at: Some(Utc::now()),
                        ..Default::default()
                    },
                });
            }
            effects.push(Effect::PlayCue(AudioCue::Final));
            effects.push(Effect::Notify(Notice::AllComplete));
            events.push(Event::SessionCompleted {
                repetitions: index,
                at: Utc::now(),
            });
        } else {
            effects.push(Effect::PlayCue(AudioCue::Return));
            effects.push(Effect::Notify(Notice::BreakComplete));
        }

        (events, effects)
    }
}

impl<C: Clock> Orchestrator<C> {
    /// True while a phase countdown exists, running or paused.
    pub fn is_active(&self) -> bool {
        self.engine.status() != TimerStatus::Uninitialized
    }
}
