use clap::Subcommand;
use serde::Serialize;

use studytimer_core::storage::{Database, Stats, SubjectStats};

#[derive(Subcommand)]
pub enum StatsAction {
    /// Today's totals per subject
    Today,
    /// All-time totals
    All,
    /// Totals over a date range
    Range {
        /// Start date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        from: Option<String>,
        /// End date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        to: Option<String>,
        /// Restrict to one subject
        #[arg(long)]
        subject: Option<String>,
    },
}

#[derive(Serialize)]
struct StatsReport {
    totals: Stats,
    subjects: Vec<SubjectStats>,
}

pub fn run(action: StatsAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    let subjects = match action {
        StatsAction::Today => db.stats_today()?,
        StatsAction::All => db.stats_range(None, None, None)?,
        StatsAction::Range { from, to, subject } => {
            db.stats_range(from.as_deref(), to.as_deref(), subject.as_deref())?
        }
    };

    let report = StatsReport {
        totals: Stats::from_subjects(&subjects),
        subjects,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
