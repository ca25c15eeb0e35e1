//! Timer state snapshots for crash/reload recovery.
//!
//! A snapshot is the serialized [`TimerState`] plus a write
//! timestamp. One is written on every state transition, before any
//! remote persistence call, so an interrupted process never loses
//! local recoverability. Storage is a single kv key with whole-value
//! overwrite semantics; there is only ever one writer.

use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, RestoreError};
use crate::storage::Database;
use crate::timer::TimerState;

/// Snapshots older than this are discarded on load.
pub const DEFAULT_MAX_AGE_MS: u64 = 24 * 60 * 60 * 1000;

const SNAPSHOT_KEY: &str = "timer_state";

/// A [`TimerState`] frozen at `written_at_ms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerSnapshot {
    #[serde(flatten)]
    pub state: TimerState,
    pub written_at_ms: u64,
}

impl TimerSnapshot {
    pub fn capture(state: &TimerState, now_ms: u64) -> Self {
        Self {
            state: state.clone(),
            written_at_ms: now_ms,
        }
    }

    pub fn age_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.written_at_ms)
    }

    pub fn is_fresh(&self, now_ms: u64, max_age_ms: u64) -> bool {
        self.age_ms(now_ms) <= max_age_ms
    }

    /// Structural validation, independent of freshness.
    ///
    /// A snapshot describing an initialized timer must carry a
    /// positive duration and an anchor; anything else is corruption
    /// and the whole snapshot is discarded rather than clamped into
    /// something displayable. A paused state with no pause instant is
    /// tolerated; `restore_local` synthesizes one.
    pub fn validate(&self) -> Result<(), RestoreError> {
        if self.state.phase.is_none() {
            return Ok(());
        }
        if self.state.duration_ms == 0 {
            return Err(RestoreError::Malformed("duration is zero".into()));
        }
        if self.state.anchor_ms.is_none() {
            return Err(RestoreError::Malformed("anchor is missing".into()));
        }
        Ok(())
    }
}

/// Persist the snapshot, overwriting any previous one.
pub fn save(db: &Database, snapshot: &TimerSnapshot) -> Result<(), DatabaseError> {
    let json = serde_json::to_string(snapshot)
        .map_err(|e| DatabaseError::QueryFailed(format!("snapshot encode: {e}")))?;
    db.kv_set(SNAPSHOT_KEY, &json)?;
    Ok(())
}

/// Load the stored snapshot, if any.
///
/// Stale and malformed snapshots are deleted and reported as absent;
/// a corrupt snapshot must never crash the caller or surface garbage
/// numbers.
pub fn load(db: &Database, now_ms: u64, max_age_ms: u64) -> Result<Option<TimerSnapshot>, DatabaseError> {
    let Some(json) = db.kv_get(SNAPSHOT_KEY)? else {
        return Ok(None);
    };
    let snapshot: TimerSnapshot = match serde_json::from_str(&json) {
        Ok(s) => s,
        Err(e) => {
            log::warn!("discarding unreadable timer snapshot: {e}");
            db.kv_delete(SNAPSHOT_KEY)?;
            return Ok(None);
        }
    };
    if !snapshot.is_fresh(now_ms, max_age_ms) {
        log::warn!(
            "discarding stale timer snapshot ({} ms old)",
            snapshot.age_ms(now_ms)
        );
        db.kv_delete(SNAPSHOT_KEY)?;
        return Ok(None);
    }
    if let Err(e) = snapshot.validate() {
        log::warn!("discarding malformed timer snapshot: {e}");
        db.kv_delete(SNAPSHOT_KEY)?;
        return Ok(None);
    }
    Ok(Some(snapshot))
}

/// Remove the stored snapshot.
pub fn clear(db: &Database) -> Result<(), DatabaseError> {
    db.kv_delete(SNAPSHOT_KEY)
}
