use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::{Phase, TimerStatus};

/// Every observable state change produces an Event.
///
/// The timer engine and orchestrator emit these without knowing who
/// listens; the CLI prints them, a GUI would render them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    PhaseStarted {
        phase: Phase,
        repetition: u32,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    /// Periodic display update, derived from `remaining_ms()`.
    Tick {
        minutes: u64,
        seconds: u64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    /// Fired exactly once when a phase runs out of time.
    PhaseCompleted {
        phase: Phase,
        repetition: u32,
        at: DateTime<Utc>,
    },
    /// All configured repetitions finished.
    SessionCompleted {
        repetitions: u32,
        at: DateTime<Utc>,
    },
    SessionCancelled {
        at: DateTime<Utc>,
    },
    /// Full timer state projection for status queries.
    StateSnapshot {
        status: TimerStatus,
        phase: Option<Phase>,
        remaining_ms: u64,
        total_ms: u64,
        repetition_index: u32,
        target_repetitions: u32,
        at: DateTime<Utc>,
    },
}
