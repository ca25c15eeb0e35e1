//! SQLite-backed session persistence.
//!
//! This is the local implementation of the persistence collaborator:
//! session records, the append-only per-phase history, aggregate
//! statistics, and a kv table backing the snapshot store. Counters on
//! a session only ever increase; status is finalized exactly once and
//! a finished session is never resurrected.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::DatabaseError;
use crate::restore::{phase_from_parity, RemoteResumeState, SessionResumeState};
use crate::session::SessionConfig;
use crate::timer::Phase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Complete,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in_progress",
            SessionStatus::Complete => "complete",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(SessionStatus::InProgress),
            "complete" => Some(SessionStatus::Complete),
            "cancelled" => Some(SessionStatus::Cancelled),
            _ => None,
        }
    }
}

/// Partial session update. Deltas are additive on the stored row;
/// the repetition count is absolute.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionPatch {
    pub completed_repetitions: Option<u32>,
    pub focus_delta_secs: Option<u64>,
    pub break_delta_secs: Option<u64>,
    pub status: Option<SessionStatus>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// One phase instance to append to the detailed history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntryNew {
    pub session_id: i64,
    pub phase: Phase,
    pub repetition: u32,
    pub started_at_epoch: i64,
    pub ended_at_epoch: Option<i64>,
    pub duration_secs: u64,
    pub completed: bool,
}

/// One stored history row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub phase: Phase,
    pub repetition: u32,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration_secs: u64,
    pub completed: bool,
}

/// Session row plus its ordered phase history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDetail {
    #[serde(flatten)]
    pub session: SessionSummary,
    pub history: Vec<HistoryEntry>,
}

/// Session row as returned by history queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: i64,
    pub subject: String,
    pub lesson: String,
    pub action_min: u32,
    pub break_min: u32,
    pub target_repetitions: u32,
    pub completed_repetitions: u32,
    pub focus_secs: u64,
    pub break_secs: u64,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// History query filters. Dates are `YYYY-MM-DD`; `search` matches
/// the lesson label as a substring.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub status: Option<SessionStatus>,
    pub search: Option<String>,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
    pub items: Vec<SessionSummary>,
}

/// Aggregate totals across sessions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub sessions: u64,
    pub completed_repetitions: u64,
    pub focus_secs: u64,
    pub break_secs: u64,
}

/// Per-subject aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectStats {
    pub subject_id: i64,
    pub subject: String,
    pub sessions: u64,
    pub completed_repetitions: u64,
    pub focus_secs: u64,
    pub break_secs: u64,
}

impl Stats {
    pub fn from_subjects(subjects: &[SubjectStats]) -> Self {
        let mut stats = Stats::default();
        for s in subjects {
            stats.sessions += s.sessions;
            stats.completed_repetitions += s.completed_repetitions;
            stats.focus_secs += s.focus_secs;
            stats.break_secs += s.break_secs;
        }
        stats
    }
}

/// SQLite database for session storage.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open the database at `~/.config/studytimer/studytimer.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, DatabaseError> {
        let path = data_dir()
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?
            .join("studytimer.db");
        let conn = Connection::open(&path).map_err(|source| DatabaseError::OpenFailed {
            path,
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::from)?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        self.conn
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS subjects (
                    id          INTEGER PRIMARY KEY AUTOINCREMENT,
                    name        TEXT NOT NULL UNIQUE,
                    created_at  TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS sessions (
                    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
                    subject_id            INTEGER NOT NULL REFERENCES subjects(id),
                    lesson                TEXT NOT NULL,
                    action_min            INTEGER NOT NULL,
                    break_min             INTEGER NOT NULL,
                    target_repetitions    INTEGER NOT NULL,
                    completed_repetitions INTEGER NOT NULL DEFAULT 0,
                    focus_secs            INTEGER NOT NULL DEFAULT 0,
                    break_secs            INTEGER NOT NULL DEFAULT 0,
                    status                TEXT NOT NULL DEFAULT 'in_progress',
                    started_at            TEXT NOT NULL,
                    ended_at              TEXT
                );

                CREATE TABLE IF NOT EXISTS session_history (
                    id            INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id    INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                    phase         TEXT NOT NULL,
                    repetition    INTEGER NOT NULL,
                    started_at    TEXT NOT NULL,
                    ended_at      TEXT,
                    duration_secs INTEGER NOT NULL,
                    completed     INTEGER NOT NULL DEFAULT 0
                );

                CREATE TABLE IF NOT EXISTS kv (
                    key   TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_sessions_started_at ON sessions(started_at);
                CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);
                CREATE INDEX IF NOT EXISTS idx_history_session ON session_history(session_id);",
            )
            .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))
    }

    // ── Sessions ─────────────────────────────────────────────────────

    /// Create a session, finding or creating its subject.
    /// Returns `(session_id, subject_id)`.
    pub fn create_session(&self, config: &SessionConfig) -> Result<(i64, i64), DatabaseError> {
        let now = Utc::now().to_rfc3339();

        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM subjects WHERE name = ?1",
                params![config.subject],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(DatabaseError::from(other)),
            })?;

        let subject_id = match existing {
            Some(id) => id,
            None => {
                self.conn.execute(
                    "INSERT INTO subjects (name, created_at) VALUES (?1, ?2)",
                    params![config.subject, now],
                )?;
                self.conn.last_insert_rowid()
            }
        };

        self.conn.execute(
            "INSERT INTO sessions (
                subject_id, lesson, action_min, break_min, target_repetitions, started_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                subject_id,
                config.lesson,
                config.action_min,
                config.break_min,
                config.repetitions,
                now,
            ],
        )?;
        Ok((self.conn.last_insert_rowid(), subject_id))
    }

    /// Apply a partial update. Second deltas add onto the stored
    /// counters; the repetition count replaces it.
    pub fn update_session(&self, session_id: i64, patch: &SessionPatch) -> Result<(), DatabaseError> {
        let mut sets: Vec<&str> = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(reps) = patch.completed_repetitions {
            sets.push("completed_repetitions = ?");
            args.push(Box::new(reps));
        }
        if let Some(delta) = patch.focus_delta_secs {
            sets.push("focus_secs = focus_secs + ?");
            args.push(Box::new(delta as i64));
        }
        if let Some(delta) = patch.break_delta_secs {
            sets.push("break_secs = break_secs + ?");
            args.push(Box::new(delta as i64));
        }
        if let Some(status) = patch.status {
            sets.push("status = ?");
            args.push(Box::new(status.as_str().to_string()));
        }
        if let Some(ended_at) = patch.ended_at {
            sets.push("ended_at = ?");
            args.push(Box::new(ended_at.to_rfc3339()));
        }
        if sets.is_empty() {
            return Err(DatabaseError::QueryFailed("no fields to update".into()));
        }

        args.push(Box::new(session_id));
        let sql = format!("UPDATE sessions SET {} WHERE id = ?", sets.join(", "));
        let changed = self
            .conn
            .execute(&sql, params_from_iter(args.iter().map(|a| a.as_ref())))?;
        if changed == 0 {
            return Err(DatabaseError::NotFound(format!("session {session_id}")));
        }
        Ok(())
    }

    /// Delete a session and its history rows.
    pub fn delete_session(&self, session_id: i64) -> Result<(), DatabaseError> {
        self.conn.execute(
            "DELETE FROM session_history WHERE session_id = ?1",
            params![session_id],
        )?;
        let changed = self
            .conn
            .execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
        if changed == 0 {
            return Err(DatabaseError::NotFound(format!("session {session_id}")));
        }
        Ok(())
    }

    // ── History ──────────────────────────────────────────────────────

    /// Append one phase instance. History rows are never updated.
    pub fn append_history(&self, entry: &HistoryEntryNew) -> Result<i64, DatabaseError> {
        let started_at = DateTime::from_timestamp(entry.started_at_epoch, 0)
            .ok_or_else(|| DatabaseError::QueryFailed("invalid start epoch".into()))?;
        let ended_at = match entry.ended_at_epoch {
            Some(epoch) => Some(
                DateTime::from_timestamp(epoch, 0)
                    .ok_or_else(|| DatabaseError::QueryFailed("invalid end epoch".into()))?,
            ),
            None => None,
        };
        self.conn.execute(
            "INSERT INTO session_history (
                session_id, phase, repetition, started_at, ended_at, duration_secs, completed
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.session_id,
                entry.phase.as_str(),
                entry.repetition,
                started_at.to_rfc3339(),
                ended_at.map(|t| t.to_rfc3339()),
                entry.duration_secs as i64,
                entry.completed as i64,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    // ── Resume ───────────────────────────────────────────────────────

    /// Compute the remote-resume payload for an in-progress session.
    ///
    /// Uses the last history row when it is incomplete; otherwise the
    /// next phase is derived from configured durations and
    /// completed-repetition parity.
    pub fn resume_state(
        &self,
        session_id: i64,
        now: DateTime<Utc>,
    ) -> Result<SessionResumeState, DatabaseError> {
        let (subject, lesson, action_min, break_min, target, completed_reps): (
            String,
            String,
            u32,
            u32,
            u32,
            u32,
        ) = self
            .conn
            .query_row(
                "SELECT m.name, s.lesson, s.action_min, s.break_min,
                        s.target_repetitions, s.completed_repetitions
                 FROM sessions s JOIN subjects m ON s.subject_id = m.id
                 WHERE s.id = ?1 AND s.status = 'in_progress'",
                params![session_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => DatabaseError::NotFound(format!(
                    "session {session_id} not found or not in progress"
                )),
                other => DatabaseError::from(other),
            })?;

        let last: Option<(String, u32, String, u64, bool)> = self
            .conn
            .query_row(
                "SELECT phase, repetition, started_at, duration_secs, completed
                 FROM session_history
                 WHERE session_id = ?1
                 ORDER BY repetition DESC, phase DESC
                 LIMIT 1",
                params![session_id],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get::<_, i64>(4)? != 0,
                    ))
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(DatabaseError::from(other)),
            })?;

        let resume = match last {
            Some((phase_str, _repetition, started_at, duration_secs, false)) => {
                let phase = parse_phase(&phase_str)?;
                let started = DateTime::parse_from_rfc3339(&started_at)
                    .map_err(|e| DatabaseError::QueryFailed(format!("bad timestamp: {e}")))?
                    .with_timezone(&Utc);
                let elapsed_secs = (now - started).num_seconds().max(0) as u64;
                let remaining_secs = duration_secs.saturating_sub(elapsed_secs);
                RemoteResumeState {
                    phase,
                    duration_min: duration_secs / 60,
                    elapsed_secs,
                    remaining_secs,
                    repetition_index: completed_reps,
                    target_repetitions: target,
                }
            }
            _ => {
                let phase = phase_from_parity(completed_reps);
                let duration_min = match phase {
                    Phase::Action => action_min,
                    Phase::Break => break_min,
                } as u64;
                RemoteResumeState {
                    phase,
                    duration_min,
                    elapsed_secs: 0,
                    remaining_secs: duration_min * 60,
                    repetition_index: completed_reps,
                    target_repetitions: target,
                }
            }
        };

        Ok(SessionResumeState {
            session_id,
            subject,
            lesson,
            action_min,
            break_min,
            resume,
        })
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// One session with every recorded phase instance, ordered by
    /// repetition then phase (actions before breaks).
    pub fn session_detail(&self, session_id: i64) -> Result<SessionDetail, DatabaseError> {
        let session = self
            .conn
            .query_row(
                "SELECT s.id, m.name, s.lesson, s.action_min, s.break_min,
                        s.target_repetitions, s.completed_repetitions,
                        s.focus_secs, s.break_secs, s.status, s.started_at, s.ended_at
                 FROM sessions s JOIN subjects m ON s.subject_id = m.id
                 WHERE s.id = ?1",
                params![session_id],
                summary_from_row,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    DatabaseError::NotFound(format!("session {session_id}"))
                }
                other => DatabaseError::from(other),
            })?;

        let mut stmt = self.conn.prepare(
            "SELECT id, phase, repetition, started_at, ended_at, duration_secs, completed
             FROM session_history
             WHERE session_id = ?1
             ORDER BY repetition, phase",
        )?;
        let rows = stmt.query_map(params![session_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, u32>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, u64>(5)?,
                row.get::<_, i64>(6)? != 0,
            ))
        })?;

        let mut history = Vec::new();
        for row in rows {
            let (id, phase, repetition, started_at, ended_at, duration_secs, completed) = row?;
            history.push(HistoryEntry {
                id,
                phase: parse_phase(&phase)?,
                repetition,
                started_at: parse_rfc3339(&started_at),
                ended_at: ended_at.as_deref().map(parse_rfc3339),
                duration_secs,
                completed,
            });
        }
        Ok(SessionDetail { session, history })
    }

    /// Paginated session history with optional filters.
    pub fn history_page(&self, filter: &HistoryFilter) -> Result<HistoryPage, DatabaseError> {
        let mut clauses: Vec<String> = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(from) = &filter.from {
            clauses.push("date(s.started_at) >= ?".into());
            args.push(Box::new(from.clone()));
        }
        if let Some(to) = &filter.to {
            clauses.push("date(s.started_at) <= ?".into());
            args.push(Box::new(to.clone()));
        }
        if let Some(subject) = &filter.subject {
            clauses.push("m.name = ?".into());
            args.push(Box::new(subject.clone()));
        }
        if let Some(status) = filter.status {
            clauses.push("s.status = ?".into());
            args.push(Box::new(status.as_str().to_string()));
        }
        if let Some(search) = &filter.search {
            clauses.push("s.lesson LIKE ?".into());
            args.push(Box::new(format!("%{search}%")));
        }

        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let total: u64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM sessions s JOIN subjects m ON s.subject_id = m.id {where_sql}"
            ),
            params_from_iter(args.iter().map(|a| a.as_ref())),
            |row| row.get(0),
        )?;

        let page = filter.page.max(1);
        let per_page = if filter.per_page == 0 { 20 } else { filter.per_page };
        let offset = (page - 1) as i64 * per_page as i64;

        let sql = format!(
            "SELECT s.id, m.name, s.lesson, s.action_min, s.break_min,
                    s.target_repetitions, s.completed_repetitions,
                    s.focus_secs, s.break_secs, s.status, s.started_at, s.ended_at
             FROM sessions s JOIN subjects m ON s.subject_id = m.id
             {where_sql}
             ORDER BY s.started_at DESC
             LIMIT {per_page} OFFSET {offset}"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params_from_iter(args.iter().map(|a| a.as_ref())),
            summary_from_row,
        )?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(HistoryPage {
            total,
            page,
            per_page,
            items,
        })
    }

    /// Per-subject aggregates for sessions started today (UTC).
    pub fn stats_today(&self) -> Result<Vec<SubjectStats>, DatabaseError> {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        self.stats_range(Some(&today), Some(&today), None)
    }

    /// Per-subject aggregates over an optional date range and subject.
    pub fn stats_range(
        &self,
        from: Option<&str>,
        to: Option<&str>,
        subject: Option<&str>,
    ) -> Result<Vec<SubjectStats>, DatabaseError> {
        let mut clauses: Vec<String> = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(from) = from {
            clauses.push("date(s.started_at) >= ?".into());
            args.push(Box::new(from.to_string()));
        }
        if let Some(to) = to {
            clauses.push("date(s.started_at) <= ?".into());
            args.push(Box::new(to.to_string()));
        }
        if let Some(subject) = subject {
            clauses.push("m.name = ?".into());
            args.push(Box::new(subject.to_string()));
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };

        let sql = format!(
            "SELECT m.id, m.name, COUNT(*),
                    COALESCE(SUM(s.completed_repetitions), 0),
                    COALESCE(SUM(s.focus_secs), 0),
                    COALESCE(SUM(s.break_secs), 0)
             FROM sessions s JOIN subjects m ON s.subject_id = m.id
             {where_sql}
             GROUP BY m.id, m.name
             ORDER BY m.name"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter().map(|a| a.as_ref())), |row| {
            Ok(SubjectStats {
                subject_id: row.get(0)?,
                subject: row.get(1)?,
                sessions: row.get(2)?,
                completed_repetitions: row.get(3)?,
                focus_secs: row.get(4)?,
                break_secs: row.get(5)?,
            })
        })?;

        let mut stats = Vec::new();
        for row in rows {
            stats.push(row?);
        }
        Ok(stats)
    }

    // ── KV ───────────────────────────────────────────────────────────

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    /// Remove a key from the kv store.
    pub fn kv_delete(&self, key: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

fn summary_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionSummary> {
    let status_str: String = row.get(9)?;
    let started_at: String = row.get(10)?;
    let ended_at: Option<String> = row.get(11)?;
    Ok(SessionSummary {
        id: row.get(0)?,
        subject: row.get(1)?,
        lesson: row.get(2)?,
        action_min: row.get(3)?,
        break_min: row.get(4)?,
        target_repetitions: row.get(5)?,
        completed_repetitions: row.get(6)?,
        focus_secs: row.get(7)?,
        break_secs: row.get(8)?,
        status: SessionStatus::parse(&status_str).unwrap_or(SessionStatus::InProgress),
        started_at: parse_rfc3339(&started_at),
        ended_at: ended_at.as_deref().map(parse_rfc3339),
    })
}

fn parse_phase(s: &str) -> Result<Phase, DatabaseError> {
    match s {
        "action" => Ok(Phase::Action),
        "break" => Ok(Phase::Break),
        other => Err(DatabaseError::QueryFailed(format!("unknown phase '{other}'"))),
    }
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
