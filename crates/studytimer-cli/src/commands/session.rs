use chrono::Utc;
use clap::Subcommand;
use serde::{Deserialize, Serialize};

use studytimer_core::restore::epoch_ms;
use studytimer_core::snapshot::{self, TimerSnapshot};
use studytimer_core::storage::{Config, Database};
use studytimer_core::{
    restore_local, ApiClient, Effect, Orchestrator, SessionConfig, SessionCreated,
    SessionResumeState,
};

const ACTIVE_SESSION_KEY: &str = "active_session";
const REMOTE_ID_PREFIX: &str = "remote_session:";

/// Pointer to the session the snapshot belongs to, stored next to it.
#[derive(Serialize, Deserialize)]
struct ActiveSession {
    session_id: Option<i64>,
    config: SessionConfig,
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start a new study session
    Start {
        /// Subject name
        #[arg(long)]
        subject: String,
        /// Lesson or topic label
        #[arg(long)]
        lesson: String,
        /// Action (focus) minutes; defaults from config
        #[arg(long, value_name = "MIN")]
        action: Option<u32>,
        /// Break minutes; defaults from config
        #[arg(long = "break", value_name = "MIN")]
        break_min: Option<u32>,
        /// Target repetitions; defaults from config
        #[arg(long)]
        reps: Option<u32>,
    },
    /// Print current timer state as JSON
    Status,
    /// Run in the foreground until the session completes
    Watch,
    /// Freeze the countdown
    Pause,
    /// Unfreeze the countdown
    Resume,
    /// Cancel the active session
    Cancel,
    /// Continue an in-progress session by id (resumes paused)
    Continue { id: i64 },
    /// Show a session with its full phase history
    Detail { id: i64 },
    /// Delete a session and its history
    Delete { id: i64 },
}

pub fn run(action: SessionAction) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = Config::load_or_default();
    let db = Database::open()?;

    match action {
        SessionAction::Start {
            subject,
            lesson,
            action,
            break_min,
            reps,
        } => {
            let session_config = SessionConfig {
                subject,
                lesson,
                action_min: action.unwrap_or(cfg.timer.action_min),
                break_min: break_min.unwrap_or(cfg.timer.break_min),
                repetitions: reps.unwrap_or(cfg.timer.repetitions),
            };
            start(cfg, &db, session_config)
        }
        SessionAction::Status => status(&cfg, &db),
        SessionAction::Watch => watch(&cfg, &db),
        SessionAction::Pause => pause(&cfg, &db),
        SessionAction::Resume => resume(&cfg, &db),
        SessionAction::Cancel => cancel(&cfg, &db),
        SessionAction::Continue { id } => continue_session(&cfg, &db, id),
        SessionAction::Detail { id } => detail(&db, id),
        SessionAction::Delete { id } => delete(&cfg, &db, id),
    }
}

fn detail(db: &Database, id: i64) -> Result<(), Box<dyn std::error::Error>> {
    let detail = db.session_detail(id)?;
    println!("{}", serde_json::to_string_pretty(&detail)?);
    Ok(())
}

fn start(
    mut cfg: Config,
    db: &Database,
    session_config: SessionConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    session_config.validate()?;

    // Session record creation is advisory: the timer runs even if
    // the database refuses.
    let session_id = match db.create_session(&session_config) {
        Ok((id, _subject_id)) => Some(id),
        Err(e) => {
            log::warn!("could not create session record, continuing without: {e}");
            None
        }
    };
    if let (Some(id), Some(mirror)) = (session_id, RemoteMirror::from_config(&cfg)) {
        // The server assigns its own id; later mirror calls must
        // address that record, not the local one.
        if let Some(created) = mirror.create(&session_config) {
            if let Err(e) = db.kv_set(&remote_key(id), &created.session_id.to_string()) {
                log::warn!("could not record remote session id: {e}");
            }
        }
    }

    let mut orch = Orchestrator::new(session_config.clone(), session_id)?;
    let (events, effects) = orch.begin();
    apply_effects(&cfg, db, &orch, &effects);

    let pointer = ActiveSession {
        session_id,
        config: session_config.clone(),
    };
    db.kv_set(ACTIVE_SESSION_KEY, &serde_json::to_string(&pointer)?)?;
    if let Err(e) = cfg.remember_session(&session_config) {
        log::warn!("could not remember session setup: {e}");
    }

    for event in &events {
        println!("{}", serde_json::to_string_pretty(event)?);
    }
    Ok(())
}

fn status(cfg: &Config, db: &Database) -> Result<(), Box<dyn std::error::Error>> {
    match load_active(cfg, db)? {
        Some(mut orch) => {
            let (_, effects) = orch.tick();
            apply_effects(cfg, db, &orch, &effects);
            if orch.is_finished() {
                db.kv_delete(ACTIVE_SESSION_KEY)?;
            }
            println!("{}", serde_json::to_string_pretty(&orch.status_event())?);
        }
        None => {
            // Uninitialized projection so callers always get the same shape.
            let idle = Orchestrator::new(placeholder_config(cfg), None)?;
            println!("{}", serde_json::to_string_pretty(&idle.status_event())?);
        }
    }
    Ok(())
}

fn watch(cfg: &Config, db: &Database) -> Result<(), Box<dyn std::error::Error>> {
    let Some(mut orch) = load_active(cfg, db)? else {
        return Err("no active session".into());
    };
    // A restored session comes back paused; watching it is the
    // explicit go-ahead.
    let (resumed, effects) = orch.resume();
    apply_effects(cfg, db, &orch, &effects);
    if let Some(event) = resumed {
        println!("{}", serde_json::to_string_pretty(&event)?);
    }
    let mut last_display = (u64::MAX, u64::MAX);

    while !orch.is_finished() {
        std::thread::sleep(std::time::Duration::from_millis(100));
        let (events, effects) = orch.tick();
        for event in &events {
            match event {
                studytimer_core::Event::Tick { minutes, seconds, .. } => {
                    if (*minutes, *seconds) != last_display {
                        last_display = (*minutes, *seconds);
                        println!("{}", serde_json::to_string(event)?);
                    }
                }
                other => println!("{}", serde_json::to_string_pretty(other)?),
            }
        }
        apply_effects(cfg, db, &orch, &effects);
    }
    db.kv_delete(ACTIVE_SESSION_KEY)?;
    Ok(())
}

fn pause(cfg: &Config, db: &Database) -> Result<(), Box<dyn std::error::Error>> {
    let Some(mut orch) = load_active(cfg, db)? else {
        return Err("no active session".into());
    };
    let (event, effects) = orch.pause();
    apply_effects(cfg, db, &orch, &effects);
    match event {
        Some(event) => println!("{}", serde_json::to_string_pretty(&event)?),
        None => println!("{}", serde_json::to_string_pretty(&orch.status_event())?),
    }
    Ok(())
}

fn resume(cfg: &Config, db: &Database) -> Result<(), Box<dyn std::error::Error>> {
    let Some(mut orch) = load_active(cfg, db)? else {
        return Err("no active session".into());
    };
    let (event, effects) = orch.resume();
    apply_effects(cfg, db, &orch, &effects);
    match event {
        Some(event) => println!("{}", serde_json::to_string_pretty(&event)?),
        None => println!("{}", serde_json::to_string_pretty(&orch.status_event())?),
    }
    Ok(())
}

fn cancel(cfg: &Config, db: &Database) -> Result<(), Box<dyn std::error::Error>> {
    let Some(mut orch) = load_active(cfg, db)? else {
        return Err("no active session".into());
    };
    let (event, effects) = orch.cancel();
    apply_effects(cfg, db, &orch, &effects);
    db.kv_delete(ACTIVE_SESSION_KEY)?;
    if let Some(event) = event {
        println!("{}", serde_json::to_string_pretty(&event)?);
    }
    Ok(())
}

fn continue_session(
    cfg: &Config,
    db: &Database,
    id: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut resume: SessionResumeState = match RemoteMirror::from_config(cfg) {
        Some(mirror) => mirror.fetch_resume_state(remote_session_id(db, id))?,
        None => db.resume_state(id, Utc::now())?,
    };
    // Local writes keep addressing the local record.
    resume.session_id = id;

    let orch = Orchestrator::from_remote(&resume)?;
    let pointer = ActiveSession {
        session_id: Some(id),
        config: orch.config().clone(),
    };
    save_snapshot(db, &orch);
    db.kv_set(ACTIVE_SESSION_KEY, &serde_json::to_string(&pointer)?)?;

    println!("{}", serde_json::to_string_pretty(&orch.status_event())?);
    Ok(())
}

fn delete(cfg: &Config, db: &Database, id: i64) -> Result<(), Box<dyn std::error::Error>> {
    let remote_id = remote_session_id(db, id);
    db.delete_session(id)?;
    if let Some(mirror) = RemoteMirror::from_config(cfg) {
        mirror.delete(remote_id);
    }
    db.kv_delete(&remote_key(id))?;
    println!("{{\"deleted\": {id}}}");
    Ok(())
}

/// Rehydrate the active orchestrator from the snapshot + pointer.
/// Returns `None` when either is missing, stale, or malformed.
fn load_active(
    cfg: &Config,
    db: &Database,
) -> Result<Option<Orchestrator>, Box<dyn std::error::Error>> {
    let Some(json) = db.kv_get(ACTIVE_SESSION_KEY)? else {
        return Ok(None);
    };
    let pointer: ActiveSession = match serde_json::from_str(&json) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("discarding unreadable active-session pointer: {e}");
            db.kv_delete(ACTIVE_SESSION_KEY)?;
            return Ok(None);
        }
    };

    let now = epoch_ms(Utc::now());
    let max_age = cfg.snapshot_max_age_ms();
    let Some(snap) = snapshot::load(db, now, max_age)? else {
        db.kv_delete(ACTIVE_SESSION_KEY)?;
        return Ok(None);
    };
    let state = restore_local(snap, now, max_age)?;
    Ok(Some(Orchestrator::from_local_state(
        pointer.config,
        pointer.session_id,
        state,
        studytimer_core::SystemClock::new(),
    )))
}

fn save_snapshot(db: &Database, orch: &Orchestrator) {
    let snap = TimerSnapshot::capture(orch.engine().state(), epoch_ms(Utc::now()));
    if let Err(e) = snapshot::save(db, &snap) {
        log::warn!("could not save timer snapshot: {e}");
    }
}

/// Execute orchestrator effects. Local writes come first; remote
/// mirroring and cue rendering are advisory and never fail the
/// command.
fn apply_effects(cfg: &Config, db: &Database, orch: &Orchestrator, effects: &[Effect]) {
    let mirror = RemoteMirror::from_config(cfg);
    for effect in effects {
        match effect {
            Effect::SaveSnapshot => save_snapshot(db, orch),
            Effect::ClearSnapshot => {
                if let Err(e) = snapshot::clear(db) {
                    log::warn!("could not clear timer snapshot: {e}");
                }
            }
            Effect::PersistSession { session_id, patch } => {
                if let Err(e) = db.update_session(*session_id, patch) {
                    log::warn!("could not save session progress, continuing locally: {e}");
                }
                if let Some(mirror) = &mirror {
                    mirror.update(remote_session_id(db, *session_id), patch);
                }
            }
            Effect::AppendHistory(entry) => {
                if let Err(e) = db.append_history(entry) {
                    log::warn!("could not append history entry, continuing locally: {e}");
                }
                if let Some(mirror) = &mirror {
                    let mut mirrored = entry.clone();
                    mirrored.session_id = remote_session_id(db, entry.session_id);
                    mirror.append_history(&mirrored);
                }
            }
            Effect::PlayCue(cue) => log::info!("audio cue: {cue:?}"),
            Effect::Notify(notice) => {
                if cfg.notifications.enabled {
                    eprintln!("notification: {notice:?}");
                }
            }
        }
    }
}

fn remote_key(local_id: i64) -> String {
    format!("{REMOTE_ID_PREFIX}{local_id}")
}

/// Server-side id for a locally created session. Falls back to the
/// local id when no mapping was recorded (mirror creation failed or
/// mirroring was enabled later).
fn remote_session_id(db: &Database, local_id: i64) -> i64 {
    match db.kv_get(&remote_key(local_id)) {
        Ok(Some(value)) => value.parse().unwrap_or(local_id),
        _ => local_id,
    }
}

fn placeholder_config(cfg: &Config) -> SessionConfig {
    SessionConfig {
        subject: "--".into(),
        lesson: "--".into(),
        action_min: cfg.timer.action_min,
        break_min: cfg.timer.break_min,
        repetitions: cfg.timer.repetitions,
    }
}

/// Best-effort mirror of local writes to the configured remote API.
struct RemoteMirror {
    client: ApiClient,
    rt: tokio::runtime::Runtime,
}

impl RemoteMirror {
    fn from_config(cfg: &Config) -> Option<Self> {
        let base_url = cfg.api.base_url.as_deref()?;
        let client = match ApiClient::new(base_url) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("invalid api.base_url, remote mirroring disabled: {e}");
                return None;
            }
        };
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(e) => {
                log::warn!("could not start async runtime, remote mirroring disabled: {e}");
                return None;
            }
        };
        Some(Self { client, rt })
    }

    fn create(&self, config: &SessionConfig) -> Option<SessionCreated> {
        match self.rt.block_on(self.client.create_session(config)) {
            Ok(created) => Some(created),
            Err(e) => {
                log::warn!("could not mirror session to server: {e}");
                None
            }
        }
    }

    fn update(&self, session_id: i64, patch: &studytimer_core::SessionPatch) {
        if let Err(e) = self.rt.block_on(self.client.update_session(session_id, patch)) {
            log::warn!("could not save to server, continuing locally: {e}");
        }
    }

    fn append_history(&self, entry: &studytimer_core::storage::HistoryEntryNew) {
        if let Err(e) = self.rt.block_on(self.client.append_history(entry)) {
            log::warn!("could not save history to server, continuing locally: {e}");
        }
    }

    fn fetch_resume_state(
        &self,
        session_id: i64,
    ) -> Result<SessionResumeState, Box<dyn std::error::Error>> {
        Ok(self.rt.block_on(self.client.fetch_resume_state(session_id))?)
    }

    fn delete(&self, session_id: i64) {
        if let Err(e) = self.rt.block_on(self.client.delete_session(session_id)) {
            log::warn!("could not delete session {session_id} on server: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_session_id_uses_recorded_mapping() {
        let db = Database::open_memory().unwrap();
        db.kv_set(&remote_key(7), "42").unwrap();
        assert_eq!(remote_session_id(&db, 7), 42);
    }

    #[test]
    fn remote_session_id_falls_back_to_local() {
        let db = Database::open_memory().unwrap();
        // No mapping recorded.
        assert_eq!(remote_session_id(&db, 7), 7);
        // Unparseable mapping.
        db.kv_set(&remote_key(7), "not-a-number").unwrap();
        assert_eq!(remote_session_id(&db, 7), 7);
    }
}
