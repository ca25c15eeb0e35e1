use serde::{Deserialize, Serialize};

/// One timed interval: focused work or rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Action,
    Break,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Action => "action",
            Phase::Break => "break",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerStatus {
    Uninitialized,
    Running,
    Paused,
}

/// Mutable timer state, owned exclusively by one [`TimerEngine`].
///
/// All elapsed-time arithmetic is done against `anchor_ms`: the
/// instant the current phase would have started had it run without
/// interruption. After a remote resume this is a synthetic instant
/// reconstructed from a server-reported elapsed figure, which is fine
/// because every computation is relative.
///
/// [`TimerEngine`]: super::TimerEngine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerState {
    /// Current phase; `None` means uninitialized.
    pub phase: Option<Phase>,
    /// Epoch ms marking the (possibly synthetic) phase start.
    pub anchor_ms: Option<u64>,
    /// Total configured length of the current phase.
    pub duration_ms: u64,
    pub paused: bool,
    /// Epoch ms of the most recent pause start; only meaningful while paused.
    pub paused_at_ms: Option<u64>,
    /// Sum of completed pause intervals within the current phase.
    ///
    /// Signed so a corrupted restored value can be detected; readers
    /// clamp negatives to zero instead of trusting them.
    pub accumulated_pause_ms: i64,
    /// Fully completed action+break pairs.
    pub repetition_index: u32,
    pub target_repetitions: u32,
}

impl Default for TimerState {
    fn default() -> Self {
        Self {
            phase: None,
            anchor_ms: None,
            duration_ms: 0,
            paused: false,
            paused_at_ms: None,
            accumulated_pause_ms: 0,
            repetition_index: 0,
            target_repetitions: 1,
        }
    }
}

impl TimerState {
    pub fn status(&self) -> TimerStatus {
        match (self.anchor_ms, self.paused) {
            (None, _) => TimerStatus::Uninitialized,
            (Some(_), true) => TimerStatus::Paused,
            (Some(_), false) => TimerStatus::Running,
        }
    }

    /// Pause accumulator with the defensive clamp applied.
    pub fn effective_pause_ms(&self) -> u64 {
        self.accumulated_pause_ms.max(0) as u64
    }
}
