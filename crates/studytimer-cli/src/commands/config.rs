use clap::Subcommand;

use studytimer_core::storage::Config;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print current configuration as TOML
    Show,
    /// Update default timer values
    SetDefaults {
        /// Default action (focus) minutes
        #[arg(long, value_name = "MIN")]
        action: Option<u32>,
        /// Default break minutes
        #[arg(long = "break", value_name = "MIN")]
        break_min: Option<u32>,
        /// Default target repetitions
        #[arg(long)]
        reps: Option<u32>,
    },
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Show => {
            let cfg = Config::load()?;
            print!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigAction::SetDefaults {
            action,
            break_min,
            reps,
        } => {
            let mut cfg = Config::load()?;
            if let Some(minutes) = action {
                cfg.timer.action_min = minutes;
            }
            if let Some(minutes) = break_min {
                cfg.timer.break_min = minutes;
            }
            if let Some(count) = reps {
                cfg.timer.repetitions = count;
            }
            cfg.save()?;
            print!("{}", toml::to_string_pretty(&cfg.timer)?);
        }
    }
    Ok(())
}
