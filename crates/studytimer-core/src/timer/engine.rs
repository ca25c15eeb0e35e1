//! Timer engine implementation.
//!
//! The engine is a wall-clock-sampling state machine. It has no
//! internal thread -- the caller invokes `tick()` periodically (the
//! CLI loop uses ~100 ms, frequent enough for a one-second display).
//!
//! ## State transitions
//!
//! ```text
//! Uninitialized -> Running -> Paused -> Running -> ... -> Uninitialized
//!        ^            |                                        ^
//!        |            +-- remaining hits 0: completion fires --+
//!        +----------------- stop() from any state -------------+
//! ```
//!
//! Completion is terminal for the phase but the engine is immediately
//! reusable via the next `start()`. Because completion transitions
//! the engine back to uninitialized, a stale tick can never fire it
//! twice or leak into the next phase.

use chrono::Utc;

use super::state::{Phase, TimerState, TimerStatus};
use crate::clock::{Clock, SystemClock};
use crate::events::Event;

/// Drift-resistant countdown over a [`Clock`].
///
/// `remaining_ms()` is a pure function of sampled timestamps, so tab
/// suspension or OS sleep between ticks is absorbed by the next
/// sample rather than accumulating as drift.
#[derive(Debug)]
pub struct TimerEngine<C: Clock = SystemClock> {
    clock: C,
    state: TimerState,
}

impl TimerEngine<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }
}

impl Default for TimerEngine<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> TimerEngine<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            state: TimerState::default(),
        }
    }

    /// Rehydrate an engine from restored state (see the restore module).
    pub fn from_state(state: TimerState, clock: C) -> Self {
        Self { clock, state }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> &TimerState {
        &self.state
    }

    pub fn status(&self) -> TimerStatus {
        self.state.status()
    }

    pub fn phase(&self) -> Option<Phase> {
        self.state.phase
    }

    pub fn duration_ms(&self) -> u64 {
        self.state.duration_ms
    }

    pub fn repetition_index(&self) -> u32 {
        self.state.repetition_index
    }

    pub fn target_repetitions(&self) -> u32 {
        self.state.target_repetitions
    }

    /// Remaining time for the current phase, clamped to
    /// `[0, duration_ms]`.
    ///
    /// While paused the computation freezes at `paused_at_ms`, which
    /// is what lets a paused snapshot silently absorb a multi-hour
    /// gap on restore. A negative pause accumulator (corrupted
    /// restore) is treated as zero, never propagated into the display.
    pub fn remaining_ms(&self) -> u64 {
        let Some(anchor) = self.state.anchor_ms else {
            return 0;
        };
        let basis = if self.state.paused {
            self.state.paused_at_ms.unwrap_or(anchor)
        } else {
            self.clock.now_ms()
        };
        let elapsed = basis
            .saturating_sub(anchor)
            .saturating_sub(self.state.effective_pause_ms())
            .min(self.state.duration_ms);
        self.state.duration_ms - elapsed
    }

    /// Full state projection for status queries.
    pub fn snapshot_event(&self) -> Event {
        Event::StateSnapshot {
            status: self.status(),
            phase: self.state.phase,
            remaining_ms: self.remaining_ms(),
            total_ms: self.state.duration_ms,
            repetition_index: self.state.repetition_index,
            target_repetitions: self.state.target_repetitions,
            at: Utc::now(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Configure the repetition counters for a new session.
    pub fn set_repetitions(&mut self, index: u32, target: u32) {
        self.state.repetition_index = index;
        self.state.target_repetitions = target.max(1);
    }

    /// One action+break pair finished.
    pub fn increment_repetition(&mut self) {
        self.state.repetition_index = self.state.repetition_index.saturating_add(1);
    }

    /// Begin a phase. Resets the anchor and all pause bookkeeping;
    /// any previous phase is discarded without completing.
    pub fn start(&mut self, phase: Phase, duration_ms: u64) -> Event {
        let now = self.clock.now_ms();
        self.state.phase = Some(phase);
        self.state.anchor_ms = Some(now);
        self.state.duration_ms = duration_ms;
        self.state.paused = false;
        self.state.paused_at_ms = None;
        self.state.accumulated_pause_ms = 0;
        Event::PhaseStarted {
            phase,
            repetition: self.state.repetition_index,
            duration_secs: duration_ms / 1000,
            at: Utc::now(),
        }
    }

    /// Freeze the countdown. No-op unless running.
    pub fn pause(&mut self) -> Option<Event> {
        if self.status() != TimerStatus::Running {
            return None;
        }
        self.state.paused = true;
        self.state.paused_at_ms = Some(self.clock.now_ms());
        Some(Event::TimerPaused {
            remaining_ms: self.remaining_ms(),
            at: Utc::now(),
        })
    }

    /// Unfreeze. Folds the completed pause interval into the
    /// accumulator; a negative accumulator (corrupted restore) is
    /// reset to zero first so the display can never go backwards.
    pub fn resume(&mut self) -> Option<Event> {
        if self.status() != TimerStatus::Paused {
            return None;
        }
        if let Some(paused_at) = self.state.paused_at_ms {
            let pause_interval = self.clock.now_ms().saturating_sub(paused_at);
            if self.state.accumulated_pause_ms < 0 {
                self.state.accumulated_pause_ms = 0;
            }
            self.state.accumulated_pause_ms = self
                .state
                .accumulated_pause_ms
                .saturating_add(pause_interval as i64);
        }
        self.state.paused = false;
        self.state.paused_at_ms = None;
        Some(Event::TimerResumed {
            remaining_ms: self.remaining_ms(),
            at: Utc::now(),
        })
    }

    /// Full cancellation: back to uninitialized, no completion fires.
    /// Repetition counters survive so a status query after cancel
    /// still reports how far the session got.
    pub fn stop(&mut self) {
        self.state.phase = None;
        self.state.anchor_ms = None;
        self.state.paused = false;
        self.state.paused_at_ms = None;
        self.state.accumulated_pause_ms = 0;
    }

    /// Periodic re-evaluation. Returns a `Tick` while running and
    /// `PhaseCompleted` exactly once when remaining reaches zero;
    /// `None` while paused or uninitialized.
    pub fn tick(&mut self) -> Option<Event> {
        if self.status() != TimerStatus::Running {
            return None;
        }
        let remaining = self.remaining_ms();
        if remaining == 0 {
            let phase = self.state.phase?;
            let repetition = self.state.repetition_index;
            self.stop();
            return Some(Event::PhaseCompleted {
                phase,
                repetition,
                at: Utc::now(),
            });
        }
        Some(Event::Tick {
            minutes: remaining / 60_000,
            seconds: (remaining % 60_000) / 1000,
            at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn engine_at(start_ms: u64) -> (TimerEngine<ManualClock>, ManualClock) {
        let clock = ManualClock::new(start_ms);
        (TimerEngine::with_clock(clock.clone()), clock)
    }

    #[test]
    fn start_pause_resume_stop() {
        let (mut engine, _clock) = engine_at(0);
        assert_eq!(engine.status(), TimerStatus::Uninitialized);

        engine.start(Phase::Action, 60_000);
        assert_eq!(engine.status(), TimerStatus::Running);

        assert!(engine.pause().is_some());
        assert_eq!(engine.status(), TimerStatus::Paused);

        assert!(engine.resume().is_some());
        assert_eq!(engine.status(), TimerStatus::Running);

        engine.stop();
        assert_eq!(engine.status(), TimerStatus::Uninitialized);
    }

    #[test]
    fn pause_is_noop_when_not_running() {
        let (mut engine, _clock) = engine_at(0);
        assert!(engine.pause().is_none());
        engine.start(Phase::Action, 60_000);
        engine.pause();
        assert!(engine.pause().is_none());
        assert!(engine.resume().is_some());
        assert!(engine.resume().is_none());
    }

    #[test]
    fn remaining_is_exact_under_wall_clock_sampling() {
        let (mut engine, clock) = engine_at(10_000);
        engine.start(Phase::Action, 25 * 60_000);
        clock.advance(90_000);
        assert_eq!(engine.remaining_ms(), 25 * 60_000 - 90_000);
    }

    #[test]
    fn pause_excludes_gap_of_any_length() {
        let (mut engine, clock) = engine_at(0);
        engine.start(Phase::Action, 600_000);
        clock.advance(120_000);
        let before = engine.remaining_ms();

        engine.pause();
        // Multi-hour absence while paused.
        clock.advance(5 * 60 * 60 * 1000);
        assert_eq!(engine.remaining_ms(), before);

        engine.resume();
        assert_eq!(engine.remaining_ms(), before);
    }

    #[test]
    fn multiple_pause_cycles_accumulate_exactly() {
        let (mut engine, clock) = engine_at(0);
        engine.start(Phase::Break, 300_000);

        clock.advance(30_000);
        engine.pause();
        clock.advance(7_000);
        engine.resume();

        clock.advance(10_000);
        engine.pause();
        clock.advance(13_000);
        engine.resume();

        assert_eq!(engine.state().accumulated_pause_ms, 20_000);
        assert_eq!(engine.remaining_ms(), 300_000 - 40_000);
    }

    #[test]
    fn remaining_never_increases_while_running() {
        let (mut engine, clock) = engine_at(0);
        engine.start(Phase::Action, 120_000);
        let mut last = engine.remaining_ms();
        for _ in 0..50 {
            clock.advance(3_000);
            let now = engine.remaining_ms();
            assert!(now <= last);
            last = now;
        }
    }

    #[test]
    fn completion_fires_exactly_once() {
        let (mut engine, clock) = engine_at(0);
        engine.start(Phase::Action, 5_000);
        clock.advance(5_000);
        match engine.tick() {
            Some(Event::PhaseCompleted { phase, .. }) => assert_eq!(phase, Phase::Action),
            other => panic!("expected completion, got {other:?}"),
        }
        // Engine is back to uninitialized; stale ticks are inert.
        assert_eq!(engine.status(), TimerStatus::Uninitialized);
        assert!(engine.tick().is_none());
    }

    #[test]
    fn no_completion_while_paused() {
        let (mut engine, clock) = engine_at(0);
        engine.start(Phase::Action, 5_000);
        clock.advance(2_000);
        engine.pause();
        clock.advance(60_000);
        assert!(engine.tick().is_none());
        assert_eq!(engine.remaining_ms(), 3_000);
    }

    #[test]
    fn tick_reports_minutes_and_seconds() {
        let (mut engine, clock) = engine_at(0);
        engine.start(Phase::Action, 25 * 60_000);
        clock.advance(61_000);
        match engine.tick() {
            Some(Event::Tick { minutes, seconds, .. }) => {
                assert_eq!(minutes, 23);
                assert_eq!(seconds, 59);
            }
            other => panic!("expected tick, got {other:?}"),
        }
    }

    #[test]
    fn stop_prevents_completion() {
        let (mut engine, clock) = engine_at(0);
        engine.start(Phase::Break, 5_000);
        clock.advance(2_000);
        engine.stop();
        clock.advance(60_000);
        assert!(engine.tick().is_none());
        assert_eq!(engine.remaining_ms(), 0);
    }

    #[test]
    fn negative_pause_accumulator_is_clamped() {
        let clock = ManualClock::new(100_000);
        let state = TimerState {
            phase: Some(Phase::Action),
            anchor_ms: Some(40_000),
            duration_ms: 120_000,
            paused: false,
            paused_at_ms: None,
            accumulated_pause_ms: -9_999,
            repetition_index: 0,
            target_repetitions: 4,
        };
        let engine = TimerEngine::from_state(state, clock);
        // Treated as zero pause: 60s elapsed out of 120s.
        assert_eq!(engine.remaining_ms(), 60_000);
    }

    #[test]
    fn resume_resets_negative_accumulator_before_adding() {
        let clock = ManualClock::new(50_000);
        let state = TimerState {
            phase: Some(Phase::Action),
            anchor_ms: Some(0),
            duration_ms: 300_000,
            paused: true,
            paused_at_ms: Some(45_000),
            accumulated_pause_ms: -123,
            repetition_index: 0,
            target_repetitions: 1,
        };
        let mut engine = TimerEngine::from_state(state, clock.clone());
        engine.resume();
        assert_eq!(engine.state().accumulated_pause_ms, 5_000);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// remaining == duration - elapsed for any valid pair.
            #[test]
            fn remaining_tracks_elapsed(
                duration_ms in 1u64..=7_200_000,
                frac in 0.0f64..=1.0,
            ) {
                let elapsed_ms = (duration_ms as f64 * frac) as u64;
                let clock = ManualClock::new(1_000_000);
                let mut engine = TimerEngine::with_clock(clock.clone());
                engine.start(Phase::Action, duration_ms);
                clock.advance(elapsed_ms);
                prop_assert_eq!(engine.remaining_ms(), duration_ms - elapsed_ms);
            }

            /// An arbitrary paused gap never changes remaining time.
            #[test]
            fn pause_gap_is_invisible(
                duration_ms in 60_000u64..=7_200_000,
                run_ms in 0u64..=59_000,
                gap_ms in 0u64..=86_400_000,
            ) {
                let clock = ManualClock::new(0);
                let mut engine = TimerEngine::with_clock(clock.clone());
                engine.start(Phase::Action, duration_ms);
                clock.advance(run_ms);
                let before = engine.remaining_ms();
                engine.pause();
                clock.advance(gap_ms);
                prop_assert_eq!(engine.remaining_ms(), before);
                engine.resume();
                prop_assert_eq!(engine.remaining_ms(), before);
            }
        }
    }
}
