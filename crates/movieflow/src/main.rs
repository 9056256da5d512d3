//! Movieflow command-line entry point.
//!
//! - `run`: one logical date (yesterday by default)
//! - `backfill`: an inclusive date range
//! - `catchup`: every owed date since `schedule.start_date`
//! - `dedupe`: keep the newest row per id in one database
//! - `config`: print the resolved configuration

use anyhow::{bail, Context, Result};
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use movieflow::config::PipelineConfig;
use movieflow::credentials::ConfigCredentialStore;
use movieflow::ledger::{catchup_dates, RunLedger};
use movieflow::pipeline::{date_range, MoviePipeline};
use movieflow::runner::{RunReport, TaskState};
use movieflow_logging::{init_logging, LogConfig};
use movieflow_protocol::RequestedParams;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "movieflow", about = "Daily movie dataset pipeline", version)]
struct Cli {
    /// Config file (default: ./movieflow.toml if present)
    #[arg(short = 'c', long, global = true, env = "MOVIEFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct ParamOverrides {
    /// Catalog search term
    #[arg(long)]
    search: Option<String>,

    /// Catalog ordering: hottest, votes, updated, active
    #[arg(long)]
    sort_by: Option<String>,

    /// Number of datasets to download
    #[arg(long, allow_negative_numbers = true)]
    quantity: Option<i64>,
}

impl ParamOverrides {
    fn apply(&self, base: &RequestedParams) -> RequestedParams {
        let mut params = base.clone();
        if let Some(search) = &self.search {
            params.search = Some(search.clone());
        }
        if let Some(sort_by) = &self.sort_by {
            params = params.with_sort_by(sort_by.clone());
        }
        if let Some(quantity) = self.quantity {
            params = params.with_quantity(quantity);
        }
        params
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the pipeline for one logical date
    Run {
        /// Logical date, YYYY-MM-DD (default: yesterday)
        #[arg(short, long)]
        date: Option<NaiveDate>,

        #[command(flatten)]
        params: ParamOverrides,
    },

    /// Run every logical date from START to END, inclusive
    Backfill {
        #[arg(long)]
        start: NaiveDate,

        #[arg(long)]
        end: NaiveDate,

        #[command(flatten)]
        params: ParamOverrides,
    },

    /// Run every date since schedule.start_date not yet succeeded
    Catchup,

    /// Keep only the newest row per id
    Dedupe {
        #[arg(long, value_enum, default_value_t = Target::Local)]
        target: Target,
    },

    /// Print the resolved configuration with secrets redacted
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Target {
    Local,
    Remote,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(err) = init_logging(LogConfig::new("movieflow").verbose(cli.verbose)) {
        eprintln!("Warning: failed to initialize file logging: {:#}", err);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("Error: failed to start runtime: {}", err);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{:#}", err);
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

/// Dispatch a command. `Ok(false)` means some run failed.
async fn run(cli: Cli) -> Result<bool> {
    let config = PipelineConfig::load(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Commands::Config => {
            print!("{}", config.redacted().to_toml()?);
            Ok(true)
        }
        Commands::Run { date, params } => {
            let date = date.unwrap_or_else(yesterday);
            let requested = params.apply(&config.params);
            execute_dates(&config, &[date], &requested).await
        }
        Commands::Backfill { start, end, params } => {
            if start > end {
                bail!("--start {} is after --end {}", start, end);
            }
            let requested = params.apply(&config.params);
            execute_dates(&config, &date_range(start, end), &requested).await
        }
        Commands::Catchup => {
            let ledger = RunLedger::load(RunLedger::default_path(&config.paths))?;
            let dates = catchup_dates(&config.schedule, Utc::now().date_naive(), &ledger);
            if dates.is_empty() {
                info!("Nothing to catch up");
                return Ok(true);
            }
            execute_dates(&config, &dates, &config.params).await
        }
        Commands::Dedupe { target } => {
            let pipeline = build_pipeline(&config)?;
            let db = match target {
                Target::Local => pipeline.local_db(),
                Target::Remote => pipeline.remote_db(),
            };
            let store = db
                .store()
                .await
                .with_context(|| format!("Failed to connect to {}", db.conn_id()))?;
            let removed = store.remove_duplicates().await?;
            info!(conn_id = db.conn_id(), removed, "Removed duplicate rows");
            println!("Removed {} duplicate rows from {}", removed, db.conn_id());
            Ok(true)
        }
    }
}

fn yesterday() -> NaiveDate {
    Utc::now().date_naive() - Duration::days(1)
}

fn build_pipeline(config: &PipelineConfig) -> Result<Arc<MoviePipeline>> {
    let credentials = ConfigCredentialStore::from_env(config.connections.clone())
        .context("Invalid MOVIEFLOW_CONN_* override")?;
    Ok(Arc::new(MoviePipeline::from_config(
        config,
        Arc::new(credentials),
    )))
}

async fn execute_dates(
    config: &PipelineConfig,
    dates: &[NaiveDate],
    requested: &RequestedParams,
) -> Result<bool> {
    let pipeline = build_pipeline(config)?;
    let mut ledger = RunLedger::load(RunLedger::default_path(&config.paths))?;

    let mut all_ok = true;
    for date in dates {
        info!(logical_date = %date, "Starting run");
        let report = pipeline.run_for_date(*date, requested).await;
        ledger.record(&report);
        if let Err(err) = ledger.save() {
            warn!(error = %err, "Failed to save run ledger");
        }
        print_report(&report);
        all_ok &= report.succeeded();
    }
    Ok(all_ok)
}

fn print_report(report: &RunReport) {
    let verdict = if report.succeeded() { "succeeded" } else { "failed" };
    println!("Run {} {}", report.logical_date, verdict);
    for (task, outcome) in &report.tasks {
        match (&outcome.state, &outcome.error) {
            (TaskState::Failed, Some(err)) => println!(
                "  {:<22} {:<16} attempts={} {}",
                task.as_str(),
                outcome.state.as_str(),
                outcome.attempts,
                err
            ),
            _ => println!(
                "  {:<22} {:<16} attempts={}",
                task.as_str(),
                outcome.state.as_str(),
                outcome.attempts
            ),
        }
    }
}
