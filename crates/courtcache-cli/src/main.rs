//! courtcache - manage the local prediction cache from the terminal.
//!
//! Inspects, prunes and clears the cache database shared with the
//! prediction pipeline.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use courtcache_core::aggregate::{ModelPerfSortField, PredictionSortField};
use courtcache_core::{CacheManager, Config, RetentionSetting};

#[derive(Parser, Debug)]
#[command(name = "courtcache", version, about = "Manage the local prediction cache")]
struct Cli {
    /// Skip the retention sweep that normally runs on startup
    #[arg(long, global = true)]
    no_cleanup: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show storage usage and per-table counts
    Usage,
    /// List cached entries
    List {
        #[command(subcommand)]
        table: ListTable,
    },
    /// Delete predictions older than the retention window
    Cleanup {
        /// Override the configured retention (days, `all` or `off`)
        #[arg(long)]
        retention: Option<RetentionSetting>,
    },
    /// Show or change retention settings
    Retention {
        #[command(subcommand)]
        action: RetentionAction,
    },
    /// Delete every prediction cached for the given dates
    DeleteDates {
        #[arg(required = true)]
        dates: Vec<String>,
    },
    /// Delete model performance entries by cache key
    DeleteModelPerf {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Remove all cached predictions and model performance data
    Clear,
    /// Print cached predictions for a date
    Get {
        date: NaiveDate,
        #[arg(long, value_delimiter = ',')]
        models: Vec<String>,
    },
    /// Cache a JSON file as the predictions for a date
    Put {
        date: NaiveDate,
        file: PathBuf,
        #[arg(long, value_delimiter = ',')]
        models: Vec<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ListTable {
    Predictions {
        #[arg(long, value_enum, default_value_t = PredictionSortArg::Date)]
        sort: PredictionSortArg,
        /// Sort ascending instead of descending
        #[arg(long)]
        asc: bool,
    },
    ModelPerformance {
        #[arg(long, value_enum, default_value_t = ModelPerfSortArg::CachedAt)]
        sort: ModelPerfSortArg,
        #[arg(long)]
        asc: bool,
    },
}

#[derive(Subcommand, Debug)]
enum RetentionAction {
    Show,
    Set {
        /// Change the model performance setting instead of predictions
        #[arg(long)]
        model_performance: bool,
        value: RetentionSetting,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PredictionSortArg {
    Date,
    Type,
    Size,
    CachedAt,
    DaysAgo,
}

impl From<PredictionSortArg> for PredictionSortField {
    fn from(arg: PredictionSortArg) -> Self {
        match arg {
            PredictionSortArg::Date => PredictionSortField::Date,
            PredictionSortArg::Type => PredictionSortField::Type,
            PredictionSortArg::Size => PredictionSortField::Size,
            PredictionSortArg::CachedAt => PredictionSortField::CachedAt,
            PredictionSortArg::DaysAgo => PredictionSortField::DaysAgo,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModelPerfSortArg {
    TimePeriod,
    Stat,
    Models,
    Size,
    CachedAt,
}

impl From<ModelPerfSortArg> for ModelPerfSortField {
    fn from(arg: ModelPerfSortArg) -> Self {
        match arg {
            ModelPerfSortArg::TimePeriod => ModelPerfSortField::TimePeriod,
            ModelPerfSortArg::Stat => ModelPerfSortField::Stat,
            ModelPerfSortArg::Models => ModelPerfSortField::Models,
            ModelPerfSortArg::Size => ModelPerfSortField::Size,
            ModelPerfSortArg::CachedAt => ModelPerfSortField::CachedAt,
        }
    }
}

/// Initialize the tracing subscriber for logging
fn init_tracing() -> WorkerGuard {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(writer))
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let _guard = init_tracing();
    info!("courtcache starting");

    let mut config = Config::load().context("Failed to load configuration")?;
    let db_path = config.db_path()?;
    let manager = CacheManager::new(db_path.clone());

    // Only a changed prediction retention needs the database
    if let Command::Retention { action } = &cli.command {
        if let Some(setting) = commands::retention(&mut config, action)? {
            manager
                .init()
                .await
                .with_context(|| format!("Failed to open cache at {}", db_path.display()))?;
            return commands::cleanup(&manager, setting).await;
        }
        return Ok(());
    }

    manager
        .init()
        .await
        .with_context(|| format!("Failed to open cache at {}", db_path.display()))?;

    let skip_startup_cleanup = cli.no_cleanup || matches!(cli.command, Command::Cleanup { .. });
    if !skip_startup_cleanup {
        let report = manager.cleanup(config.retention()).await;
        if report.deleted > 0 {
            info!(deleted = report.deleted, "Startup cleanup removed expired predictions");
        }
    }

    match cli.command {
        Command::Usage => commands::usage(&manager).await,
        Command::List { table } => commands::list(&manager, table).await,
        Command::Cleanup { retention } => {
            commands::cleanup(&manager, retention.unwrap_or_else(|| config.retention())).await
        }
        Command::DeleteDates { dates } => commands::delete_dates(&manager, &dates).await,
        Command::DeleteModelPerf { keys } => commands::delete_model_perf(&manager, &keys).await,
        Command::Clear => commands::clear(&manager).await,
        Command::Get { date, models } => commands::get(&manager, date, &models).await,
        Command::Put { date, file, models } => commands::put(&manager, date, &file, &models).await,
        Command::Retention { .. } => Ok(()),
    }
}
