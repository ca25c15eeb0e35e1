//! Restoration reconciliation.
//!
//! Two provenances rebuild a live timer from stored state:
//!
//! * **Local resume** -- the same machine reloaded mid-session. The
//!   snapshot's instants are already consistent with the local clock,
//!   so rehydration is direct: a paused snapshot absorbs the offline
//!   gap for free (pause freezes `remaining_ms()`), and a running one
//!   simply reports less remaining time because the computation is a
//!   pure function of `now`.
//!
//! * **Remote resume** -- the user continues a session the
//!   persistence layer recorded as in-progress, typically from a
//!   different machine. No stored anchor is meaningful here; instead
//!   a synthetic anchor is reconstructed from the server-computed
//!   elapsed figure. The engine always comes back *paused*: after an
//!   absence of unknown length, automatic resumption would replay
//!   audio and misfire notifications, so the user must explicitly
//!   press play.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RestoreError;
use crate::snapshot::TimerSnapshot;
use crate::timer::{Phase, TimerState};

/// In-progress session state as reported by the persistence layer.
///
/// `elapsed_secs`/`remaining_secs` are computed server-side from the
/// last history entry (or from configured durations when none exists
/// yet) and may be stale by the round-trip time; the engine's clamps
/// handle that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteResumeState {
    pub phase: Phase,
    pub duration_min: u64,
    pub elapsed_secs: u64,
    pub remaining_secs: u64,
    pub repetition_index: u32,
    pub target_repetitions: u32,
}

/// Remote resume payload plus the session metadata needed to rebuild
/// the orchestrator around it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResumeState {
    pub session_id: i64,
    pub subject: String,
    pub lesson: String,
    pub action_min: u32,
    pub break_min: u32,
    #[serde(flatten)]
    pub resume: RemoteResumeState,
}

/// Provenance A: rehydrate from a local snapshot.
///
/// The snapshot must be fresh and structurally valid; a paused state
/// with no pause instant gets one synthesized at `now` so the frozen
/// remaining time carries over unchanged.
pub fn restore_local(
    snapshot: TimerSnapshot,
    now_ms: u64,
    max_age_ms: u64,
) -> Result<TimerState, RestoreError> {
    if !snapshot.is_fresh(now_ms, max_age_ms) {
        return Err(RestoreError::Stale {
            age_ms: snapshot.age_ms(now_ms),
            window_ms: max_age_ms,
        });
    }
    snapshot.validate()?;

    let mut state = snapshot.state;
    if state.accumulated_pause_ms < 0 {
        state.accumulated_pause_ms = 0;
    }
    if state.paused && state.paused_at_ms.is_none() {
        state.paused_at_ms = Some(now_ms);
    }
    Ok(state)
}

/// Provenance B: reconstruct from a server-reported elapsed/remaining
/// pair.
///
/// The anchor is synthetic -- `now - elapsed` -- which is sufficient
/// because all engine arithmetic is relative. Pause history from
/// before the interruption is already folded into `elapsed_secs`, so
/// the accumulator restarts at zero. The result is always paused.
pub fn restore_remote(remote: &RemoteResumeState, now_ms: u64) -> Result<TimerState, RestoreError> {
    let duration_ms = remote
        .duration_min
        .checked_mul(60_000)
        .ok_or_else(|| RestoreError::InvalidRemoteState("duration overflows".into()))?;
    if duration_ms == 0 {
        return Err(RestoreError::InvalidRemoteState(
            "configured duration is zero".into(),
        ));
    }
    let elapsed_ms = remote
        .elapsed_secs
        .checked_mul(1000)
        .ok_or_else(|| RestoreError::InvalidRemoteState("elapsed overflows".into()))?;

    Ok(TimerState {
        phase: Some(remote.phase),
        anchor_ms: Some(now_ms.saturating_sub(elapsed_ms)),
        duration_ms,
        paused: true,
        paused_at_ms: Some(now_ms),
        accumulated_pause_ms: 0,
        repetition_index: remote.repetition_index,
        target_repetitions: remote.target_repetitions.max(1),
    })
}

/// Current-phase type when no incomplete history entry exists:
/// phases strictly alternate starting with action, so an even
/// completed-repetition count means an action phase is due.
/// Documented behavior carried over from the original system; it is
/// never cross-checked against the recorded sequence.
pub fn phase_from_parity(completed_repetitions: u32) -> Phase {
    if completed_repetitions % 2 == 0 {
        Phase::Action
    } else {
        Phase::Break
    }
}

/// Convenience for tests and drivers: epoch ms from a chrono instant.
pub fn epoch_ms(at: DateTime<Utc>) -> u64 {
    at.timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::snapshot::DEFAULT_MAX_AGE_MS;
    use crate::timer::TimerEngine;

    fn snapshot_running(anchor_ms: u64, duration_ms: u64, written_at_ms: u64) -> TimerSnapshot {
        TimerSnapshot {
            state: TimerState {
                phase: Some(Phase::Action),
                anchor_ms: Some(anchor_ms),
                duration_ms,
                paused: false,
                paused_at_ms: None,
                accumulated_pause_ms: 0,
                repetition_index: 0,
                target_repetitions: 4,
            },
            written_at_ms,
        }
    }

    #[test]
    fn local_resume_running_loses_exactly_the_gap() {
        // Started at t=0, snapshot written at t=300s with 22min left.
        let duration = 25 * 60_000;
        let snap = snapshot_running(0, duration, 300_000);

        // Reload 40 seconds later.
        let now = 340_000u64;
        let state = restore_local(snap, now, DEFAULT_MAX_AGE_MS).unwrap();
        let engine = TimerEngine::from_state(state, ManualClock::new(now));
        assert_eq!(engine.remaining_ms(), duration - 340_000);
    }

    #[test]
    fn local_resume_paused_absorbs_the_gap() {
        let mut snap = snapshot_running(0, 600_000, 120_000);
        snap.state.paused = true;
        snap.state.paused_at_ms = Some(100_000);

        // Six hours later the frozen remaining time is unchanged.
        let now = 120_000 + 6 * 60 * 60 * 1000;
        let state = restore_local(snap, now, DEFAULT_MAX_AGE_MS).unwrap();
        let engine = TimerEngine::from_state(state, ManualClock::new(now));
        assert_eq!(engine.remaining_ms(), 600_000 - 100_000);
    }

    #[test]
    fn local_resume_rejects_stale_snapshot() {
        let snap = snapshot_running(0, 600_000, 0);
        let now = DEFAULT_MAX_AGE_MS + 1;
        assert!(matches!(
            restore_local(snap, now, DEFAULT_MAX_AGE_MS),
            Err(RestoreError::Stale { .. })
        ));
    }

    #[test]
    fn local_resume_clamps_negative_pause_accumulator() {
        let mut snap = snapshot_running(0, 600_000, 1_000);
        snap.state.accumulated_pause_ms = -5_000;
        let state = restore_local(snap, 2_000, DEFAULT_MAX_AGE_MS).unwrap();
        assert_eq!(state.accumulated_pause_ms, 0);
    }

    #[test]
    fn local_resume_synthesizes_pause_instant() {
        let mut snap = snapshot_running(0, 600_000, 1_000);
        snap.state.paused = true;
        snap.state.paused_at_ms = None;
        let state = restore_local(snap, 9_000, DEFAULT_MAX_AGE_MS).unwrap();
        assert_eq!(state.paused_at_ms, Some(9_000));
    }

    #[test]
    fn remote_resume_reconstructs_synthetic_anchor() {
        let remote = RemoteResumeState {
            phase: Phase::Action,
            duration_min: 25,
            elapsed_secs: 600,
            remaining_secs: 900,
            repetition_index: 2,
            target_repetitions: 4,
        };
        let now = 1_000_000u64;
        let state = restore_remote(&remote, now).unwrap();
        assert!(state.paused);
        assert_eq!(state.paused_at_ms, Some(now));
        assert_eq!(state.accumulated_pause_ms, 0);
        assert_eq!(state.anchor_ms, Some(now - 600_000));

        let engine = TimerEngine::from_state(state, ManualClock::new(now));
        assert_eq!(engine.remaining_ms(), 900_000);
    }

    #[test]
    fn remote_resume_rejects_zero_duration() {
        let remote = RemoteResumeState {
            phase: Phase::Break,
            duration_min: 0,
            elapsed_secs: 0,
            remaining_secs: 0,
            repetition_index: 0,
            target_repetitions: 1,
        };
        assert!(matches!(
            restore_remote(&remote, 1_000),
            Err(RestoreError::InvalidRemoteState(_))
        ));
    }

    #[test]
    fn remote_resume_elapsed_beyond_duration_clamps_to_zero_remaining() {
        let remote = RemoteResumeState {
            phase: Phase::Action,
            duration_min: 5,
            elapsed_secs: 3_600,
            remaining_secs: 0,
            repetition_index: 0,
            target_repetitions: 2,
        };
        let now = 10_000_000u64;
        let state = restore_remote(&remote, now).unwrap();
        let engine = TimerEngine::from_state(state, ManualClock::new(now));
        assert_eq!(engine.remaining_ms(), 0);
    }

    #[test]
    fn parity_rule_alternates_starting_with_action() {
        assert_eq!(phase_from_parity(0), Phase::Action);
        assert_eq!(phase_from_parity(1), Phase::Break);
        assert_eq!(phase_from_parity(2), Phase::Action);
    }
}
