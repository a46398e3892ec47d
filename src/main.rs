mod app;
mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gridcal")]
#[command(about = "Personal scheduling engine synced to a weekly spreadsheet grid")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an occurrence (or a recurring series with --repeat)
    Add {
        /// Event title
        title: String,

        /// Date (YYYY-MM-DD)
        #[arg(short, long)]
        date: String,

        /// Start time (HH:MM)
        #[arg(short, long)]
        start: String,

        /// End time (HH:MM)
        #[arg(short, long)]
        end: String,

        /// Free-text notes
        #[arg(long)]
        notes: Option<String>,

        /// Category: class, work, personal, sport, study, meeting
        #[arg(short, long, default_value = "personal")]
        category: String,

        /// Recurrence: none, daily, weekly, monthly
        #[arg(short, long, default_value = "none")]
        repeat: String,

        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,

        /// Alarm lead time in minutes
        #[arg(long, default_value_t = 5)]
        alarm_lead: u32,

        /// Disable the alarm for this occurrence
        #[arg(long)]
        no_alarm: bool,

        /// Weeks of instances to generate for recurring series
        #[arg(long)]
        horizon_weeks: Option<u32>,

        /// Skip the conflict prompt and book over overlaps
        #[arg(short, long)]
        force: bool,
    },
    /// Edit an occurrence (or its whole series with --series)
    Edit {
        /// Occurrence id (or unique prefix)
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        #[arg(long)]
        date: Option<String>,

        #[arg(long)]
        start: Option<String>,

        #[arg(long)]
        end: Option<String>,

        #[arg(long)]
        category: Option<String>,

        #[arg(long)]
        tags: Option<String>,

        #[arg(long)]
        alarm_lead: Option<u32>,

        /// Apply to the master and all non-detached instances
        #[arg(long)]
        series: bool,
    },
    /// Delete an occurrence, future instances, or a whole series
    Delete {
        /// Occurrence id (or unique prefix)
        id: String,

        /// Delete this and all future instances of its series
        #[arg(long)]
        future: bool,

        /// Delete the whole series, past instances included
        #[arg(long)]
        series: bool,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// List occurrences for a day, week or month
    List {
        /// Span: day, week or month
        #[arg(default_value = "week")]
        span: String,

        /// Anchor date (YYYY-MM-DD), default today
        #[arg(long)]
        date: Option<String>,
    },
    /// Search occurrences by title or notes
    Search { text: String },
    /// Show free blocks for a day
    Free {
        /// Date (YYYY-MM-DD)
        date: String,

        /// Minimum block length in minutes
        #[arg(long, default_value_t = 30)]
        min_minutes: u32,

        /// Earliest hour considered (HH:MM)
        #[arg(long, default_value = "07:00")]
        day_start: String,

        /// Latest hour considered (HH:MM)
        #[arg(long, default_value = "22:00")]
        day_end: String,
    },
    /// Suggest alternative slots of a given duration
    Suggest {
        /// Date (YYYY-MM-DD)
        date: String,

        /// Required duration in minutes
        #[arg(long, default_value_t = 60)]
        duration: u32,
    },
    /// One-line availability summary for a day
    Summary { date: String },
    /// Show series membership for an occurrence id
    Info { id: String },
    /// Full resync of the external grid (repair path)
    Sync,
    /// Import ad-hoc edits typed into a week page
    Import {
        /// Any date in the week to import, default today
        date: Option<String>,
    },
    /// Archive week pages that have fully elapsed
    Archive,
    /// Ensure the next N weekly pages exist
    Weeks {
        #[arg(default_value_t = 12)]
        n: u32,
    },
    /// Manage reminders
    Remind {
        #[command(subcommand)]
        action: RemindAction,
    },
    /// Stay running and fire alarms for upcoming occurrences
    Watch {
        /// How many days ahead to arm
        #[arg(long, default_value_t = 7)]
        days: u32,
    },
    /// Show recent audit records
    Log {
        #[arg(default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum RemindAction {
    /// Save a reminder
    Add {
        content: String,

        /// Category: urgent, important, task, note, idea
        #[arg(short, long, default_value = "note")]
        category: String,

        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<String>,

        /// Due time (HH:MM)
        #[arg(long)]
        at: Option<String>,

        /// Priority 1 (highest) .. 5; defaults by category
        #[arg(short, long)]
        priority: Option<u8>,
    },
    /// List reminders (pending by default)
    List {
        /// Include completed and cancelled
        #[arg(long)]
        all: bool,
    },
    /// Mark a reminder completed
    Done { id: i64 },
    /// Cancel a reminder
    Cancel { id: i64 },
    /// Permanently delete a reminder
    Remove { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Add {
            title,
            date,
            start,
            end,
            notes,
            category,
            repeat,
            tags,
            alarm_lead,
            no_alarm,
            horizon_weeks,
            force,
        } => {
            commands::add::run(commands::add::AddArgs {
                title,
                date,
                start,
                end,
                notes,
                category,
                repeat,
                tags,
                alarm_lead,
                no_alarm,
                horizon_weeks,
                force,
            })
            .await
        }
        Commands::Edit {
            id,
            title,
            notes,
            date,
            start,
            end,
            category,
            tags,
            alarm_lead,
            series,
        } => {
            commands::edit::run(commands::edit::EditArgs {
                id,
                title,
                notes,
                date,
                start,
                end,
                category,
                tags,
                alarm_lead,
                series,
            })
            .await
        }
        Commands::Delete {
            id,
            future,
            series,
            yes,
        } => commands::delete::run(&id, future, series, yes).await,
        Commands::List { span, date } => commands::view::list(&span, date.as_deref()),
        Commands::Search { text } => commands::view::search(&text),
        Commands::Free {
            date,
            min_minutes,
            day_start,
            day_end,
        } => commands::view::free(&date, min_minutes, &day_start, &day_end),
        Commands::Suggest { date, duration } => commands::view::suggest(&date, duration),
        Commands::Summary { date } => commands::view::summary(&date),
        Commands::Info { id } => commands::view::info(&id),
        Commands::Sync => commands::sync::full_sync().await,
        Commands::Import { date } => commands::sync::import(date.as_deref()).await,
        Commands::Archive => commands::sync::archive().await,
        Commands::Weeks { n } => commands::sync::ensure_weeks(n).await,
        Commands::Remind { action } => match action {
            RemindAction::Add {
                content,
                category,
                due,
                at,
                priority,
            } => {
                commands::remind::add(&content, &category, due.as_deref(), at.as_deref(), priority)
            }
            RemindAction::List { all } => commands::remind::list(all),
            RemindAction::Done { id } => commands::remind::done(id),
            RemindAction::Cancel { id } => commands::remind::cancel(id),
            RemindAction::Remove { id } => commands::remind::remove(id),
        },
        Commands::Watch { days } => commands::watch::run(days).await,
        Commands::Log { limit } => commands::view::audit_log(limit),
    }
}
