use clap::Args;

use studytimer_core::storage::{Database, HistoryFilter, SessionStatus};

#[derive(Args)]
pub struct HistoryArgs {
    /// Start date (YYYY-MM-DD, inclusive)
    #[arg(long)]
    from: Option<String>,
    /// End date (YYYY-MM-DD, inclusive)
    #[arg(long)]
    to: Option<String>,
    /// Filter by subject name
    #[arg(long)]
    subject: Option<String>,
    /// Filter by status: in_progress, complete, cancelled
    #[arg(long)]
    status: Option<String>,
    /// Substring match on the lesson label
    #[arg(long)]
    search: Option<String>,
    #[arg(long, default_value = "1")]
    page: u32,
    #[arg(long, default_value = "20")]
    per_page: u32,
}

pub fn run(args: HistoryArgs) -> Result<(), Box<dyn std::error::Error>> {
    let status = match args.status.as_deref() {
        Some(s) => Some(
            SessionStatus::parse(s).ok_or_else(|| format!("unknown status '{s}'"))?,
        ),
        None => None,
    };

    let db = Database::open()?;
    let page = db.history_page(&HistoryFilter {
        from: args.from,
        to: args.to,
        subject: args.subject,
        status,
        search: args.search,
        page: args.page,
        per_page: args.per_page,
    })?;

    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}
