//! # Studytimer Core Library
//!
//! Core business logic for the studytimer study-session timer. All
//! operations are available through a standalone CLI binary built on
//! top of this crate; any GUI would be a thin layer over the same
//! library.
//!
//! ## Architecture
//!
//! - **Timer Engine**: a wall-clock-sampling state machine that
//!   requires the caller to periodically invoke `tick()` for progress
//!   updates; remaining time is recomputed from timestamps, never
//!   accumulated from tick counts
//! - **Session Orchestrator**: drives the action/break phase sequence
//!   and emits side-effect requests without performing them
//! - **Storage**: SQLite-based session storage and TOML-based
//!   configuration
//! - **Snapshot/Restore**: crash-safe local snapshots and
//!   reconciliation of local or server-reported in-progress sessions
//! - **API**: optional remote persistence client
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: core timer state machine
//! - [`Orchestrator`]: session lifecycle driver
//! - [`Database`]: session and statistics persistence
//! - [`Config`]: application configuration management

pub mod api;
pub mod clock;
pub mod error;
pub mod events;
pub mod restore;
pub mod session;
pub mod snapshot;
pub mod storage;
pub mod timer;

pub use api::{ApiClient, ApiEnvelope, SessionCreated};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{
    ApiError, ConfigError, CoreError, DatabaseError, RestoreError, ValidationError,
};
pub use events::Event;
pub use restore::{restore_local, restore_remote, RemoteResumeState, SessionResumeState};
pub use session::{AudioCue, Effect, Notice, Orchestrator, SessionConfig};
pub use snapshot::TimerSnapshot;
pub use storage::{Config, Database, HistoryFilter, SessionPatch, SessionStatus};
pub use timer::{Phase, TimerEngine, TimerState, TimerStatus};
