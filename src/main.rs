use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use fillrate::config::LoggingConfig;
use fillrate::error::{Error, FillRateErrorTrait};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(
    name = "fillrate",
    version,
    about = "Bus route fill-rate scraper",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); defaults to FILLRATE_LOG_FORMAT or text
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape every route and replace the snapshot
    Run {
        /// Route list CSV (Route_name, Route_link)
        #[arg(short, long)]
        routes: Option<PathBuf>,

        /// TOML config file; environment variables are used otherwise
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of travel dates per route
        #[arg(long)]
        days: Option<u32>,

        /// Maximum concurrently open pages
        #[arg(long)]
        tabs: Option<usize>,

        /// First travel date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        start_date: Option<NaiveDate>,

        /// JSON backup path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Skip the snapshot database, write only the backup
        #[arg(long, default_value = "false")]
        no_db: bool,

        /// Use a SQLite file as the snapshot store
        #[arg(long)]
        sqlite: Option<PathBuf>,

        /// Whole-run deadline in seconds
        #[arg(long)]
        run_timeout: Option<u64>,

        /// Write Prometheus metrics to this file when the run ends
        #[arg(long)]
        metrics_out: Option<PathBuf>,
    },

    /// Print the current snapshot
    Snapshot {
        /// Read from a SQLite file instead of PostgreSQL
        #[arg(long)]
        sqlite: Option<PathBuf>,

        /// TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Maximum rows to print
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Rewrite the travel date of a route URL
    Rewrite {
        /// Route URL containing onward/doj parameters
        url: String,

        /// Travel date (YYYY-MM-DD)
        date: NaiveDate,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let logging = LoggingConfig::from_env();
    let format = cli.log_format.as_deref().unwrap_or(&logging.format);
    setup_tracing(format, &logging.level, cli.verbose)?;

    if let Err(e) = dispatch(cli.command).await {
        let err = Error::from(e);
        tracing::error!(
            category = err.category().label(),
            recoverable = err.is_recoverable(),
            error = %err,
            "Command failed"
        );
        eprintln!("Error: {}", err.description());
        std::process::exit(1);
    }

    Ok(())
}

async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            routes,
            config,
            days,
            tabs,
            start_date,
            output,
            no_db,
            sqlite,
            run_timeout,
            metrics_out,
        } => {
            tracing::info!(
                routes = ?routes,
                days = ?days,
                tabs = ?tabs,
                no_db = %no_db,
                "Starting run command"
            );
            let args = commands::RunArgs {
                routes,
                config,
                days,
                tabs,
                start_date,
                output,
                no_db,
                sqlite,
                run_timeout,
                metrics_out,
            };
            commands::run(args).await?;
        }

        Commands::Snapshot {
            sqlite,
            config,
            limit,
        } => {
            commands::snapshot(config, sqlite, limit).await?;
        }

        Commands::Rewrite { url, date } => {
            commands::rewrite(&url, date);
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let default_filter = if verbose {
        String::from("fillrate=debug,info")
    } else {
        format!("fillrate={level},warn")
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
