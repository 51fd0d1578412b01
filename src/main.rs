//! # dayweave
//!
//! A personal scheduling assistant for the terminal. Tasks can be one-off or
//! repeat daily, weekly, monthly or yearly; each repetition is tracked on its
//! own so finishing today's standup does not finish tomorrow's.
//!
//! ## Usage
//!
//! ```bash
//! # A weekly task with a 15 minute reminder
//! dayweave add "Team sync" --start 2025-07-07T10:00 --duration 30 --recur weekly --reminder 15
//!
//! # Today's agenda, or the next week
//! dayweave agenda
//! dayweave agenda --days 7
//!
//! # Complete one occurrence
//! dayweave complete 3f2a9c1e_2025-07-14
//!
//! # Stay in the foreground and print reminders as they come due
//! dayweave watch
//! ```
//!
//! ## Data Storage
//!
//! The schedule lives in `schedule.json` under the local data directory
//! (`~/.local/share/dayweave/` on Linux). Override it with `DAYWEAVE_DB`.
//! Settings are read from `config.toml` in the config directory, or from
//! the file named by `DAYWEAVE_CONFIG`. Set `DAYWEAVE_LOG` (e.g. `debug`)
//! for diagnostics on stderr.

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::EnvFilter;

use dayweave::commands::*;
use dayweave::config::load_config;
use dayweave::models::{Priority, Recurrence};

#[derive(Parser)]
#[command(name = "dayweave")]
#[command(about = "Personal scheduling assistant", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new task
    Add {
        /// Task title (quoted if it has spaces)
        title: String,
        /// Longer description
        #[arg(short = 'D', long)]
        description: Option<String>,
        /// Start time, YYYY-MM-DDTHH:MM or RFC 3339. Omit for an unscheduled task
        #[arg(short, long)]
        start: Option<String>,
        /// Duration in minutes
        #[arg(short, long, default_value_t = 30)]
        duration: u32,
        /// Priority (high, medium, low)
        #[arg(short, long, default_value = "medium")]
        priority: Priority,
        /// Recurrence (none, daily, weekly, monthly, yearly)
        #[arg(short, long, default_value = "none")]
        recur: Recurrence,
        /// Reminder lead time in minutes
        #[arg(long)]
        reminder: Option<u32>,
    },
    /// Show occurrences day by day
    Agenda {
        /// First day, YYYY-MM-DD (default today)
        #[arg(short, long)]
        date: Option<String>,
        /// Number of days to show
        #[arg(short = 'n', long, default_value_t = 1)]
        days: u32,
    },
    /// List tasks without a start time
    Unscheduled,
    /// Print a task or occurrence as JSON
    Show {
        id: String,
    },
    /// Toggle completion of a task or occurrence
    Complete {
        id: String,
        /// Occurrence date for a recurring task id (default today)
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Remove a task (an occurrence id removes the whole series)
    Remove {
        id: String,
    },
    /// Restore the most recently removed task
    Undo,
    /// Edit a task
    Edit {
        id: String,
        #[arg(short, long)]
        title: Option<String>,
        #[arg(short = 'D', long)]
        description: Option<String>,
        /// New start time. Through an occurrence id this shifts the series
        #[arg(short, long)]
        start: Option<String>,
        #[arg(short, long)]
        duration: Option<u32>,
        #[arg(short, long)]
        priority: Option<Priority>,
        #[arg(short, long)]
        recur: Option<Recurrence>,
        #[arg(long)]
        reminder: Option<u32>,
        /// Clear the start time
        #[arg(long, conflicts_with = "start")]
        unschedule: bool,
    },
    /// Give an unscheduled task a start time
    Schedule {
        id: String,
        #[arg(short, long)]
        start: String,
    },
    /// Find free time and suggest fillers
    Gaps {
        #[arg(short, long)]
        date: Option<String>,
    },
    /// Show how full the coming days are
    Load {
        #[arg(short, long)]
        date: Option<String>,
        #[arg(short = 'n', long, default_value_t = 7)]
        days: u32,
    },
    /// Today's briefing
    Briefing,
    /// Write a backup file
    Backup {
        path: PathBuf,
    },
    /// Replace all data with a backup file
    Restore {
        path: PathBuf,
    },
    /// Import tasks from a text-to-task JSON reply
    Import {
        path: PathBuf,
    },
    /// Apply a rebalanced schedule proposal
    Rebalance {
        path: PathBuf,
    },
    /// Deliver reminders and follow-ups in the foreground
    Watch,
    /// Reset the database (delete all tasks)
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for (bash, zsh, fish, powershell, elvish)
        shell: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("DAYWEAVE_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Some(Commands::Add { title, description, start, duration, priority, recur, reminder }) => {
            cmd_add(&config, title, description, start, duration, priority, recur, reminder, false).map(|_| ())
        }
        Some(Commands::Agenda { date, days }) => cmd_agenda(&config, date, days),
        Some(Commands::Unscheduled) => cmd_unscheduled(&config),
        Some(Commands::Show { id }) => cmd_show(&config, id),
        Some(Commands::Complete { id, date }) => cmd_complete(&config, id, date, false).map(|_| ()),
        Some(Commands::Remove { id }) => cmd_remove(&config, id, false),
        Some(Commands::Undo) => cmd_undo(&config, false).map(|_| ()),
        Some(Commands::Edit { id, title, description, start, duration, priority, recur, reminder, unschedule }) => {
            let edit = TaskEdit { title, description, start, duration, priority, recurrence: recur, reminder, unschedule };
            cmd_edit(&config, id, edit, false)
        }
        Some(Commands::Schedule { id, start }) => cmd_schedule(&config, id, start, false),
        Some(Commands::Gaps { date }) => cmd_gaps(&config, date),
        Some(Commands::Load { date, days }) => cmd_load(&config, date, days),
        Some(Commands::Briefing) | None => cmd_briefing(&config),
        Some(Commands::Backup { path }) => cmd_backup(&config, &path, false),
        Some(Commands::Restore { path }) => cmd_restore(&config, &path, false),
        Some(Commands::Import { path }) => cmd_import(&config, &path, false).map(|_| ()),
        Some(Commands::Rebalance { path }) => cmd_rebalance(&config, &path, false).map(|_| ()),
        Some(Commands::Watch) => cmd_watch(&config).await,
        Some(Commands::Reset { force }) => cmd_reset(force),
        Some(Commands::Completions { shell }) => {
            let shell_enum = match shell.as_str() {
                "bash" => Shell::Bash,
                "zsh" => Shell::Zsh,
                "fish" => Shell::Fish,
                "powershell" => Shell::PowerShell,
                "elvish" => Shell::Elvish,
                _ => {
                    eprintln!("Unsupported shell: {}", shell);
                    return ExitCode::FAILURE;
                }
            };
            let mut cmd = Cli::command();
            generate(shell_enum, &mut cmd, "dayweave", &mut io::stdout());
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
