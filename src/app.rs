//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - builds the immutable `MonitorConfig` (environment + flag overrides)
//! - wires the HTTP transport and the CSV ledger into the pipeline
//! - prints results as JSON on stdout

use std::time::Duration;

use chrono::NaiveDate;
use clap::Parser;
use serde::Serialize;
use tracing::info;

use crate::cli::{BackfillArgs, Cli, Command, ListArgs, RunArgs, SeriesArgs};
use crate::data::{ReqwestTransport, ThreadSleeper};
use crate::domain::MonitorConfig;
use crate::error::AppError;
use crate::store::{CsvLedger, HistoricalLedger};

pub mod backfill;
pub mod pipeline;

pub use pipeline::{Pipeline, RunOutcome, RunStatus};

/// Entry point for the `rfr` binary.
pub fn run() -> Result<RunStatus, AppError> {
    // `rfr` and `rfr --date 2024-11` behave like `rfr run ...`.
    let argv = rewrite_args(std::env::args().collect());
    let Some(cli) = parse_cli(argv)? else {
        return Ok(RunStatus::Success);
    };
    let config = MonitorConfig::from_env(|key| cli.global.lookup(key))?;

    match cli.command {
        Command::Run(args) => handle_run(&config, args),
        Command::Backfill(args) => handle_backfill(&config, args),
        Command::List(args) => handle_list(&config, args),
        Command::Stats => handle_stats(&config),
        Command::Series(args) => handle_series(&config, args),
    }
}

/// Parse argv. `--help`/`--version` print and yield `None`; usage errors
/// exit with 1 like any other failure.
fn parse_cli(argv: Vec<String>) -> Result<Option<Cli>, AppError> {
    match Cli::try_parse_from(argv) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) if !err.use_stderr() => {
            let _ = err.print();
            Ok(None)
        }
        Err(err) => Err(AppError::new(1, err.render().to_string().trim_end())),
    }
}

fn handle_run(config: &MonitorConfig, args: RunArgs) -> Result<RunStatus, AppError> {
    let transport = transport(config)?;
    let mut ledger = open_ledger(config)?;
    let pipeline = Pipeline::new(config, &transport, &ThreadSleeper);

    let outcome = pipeline.run(&mut ledger, args.date, args.force)?;
    print_json(&outcome)?;
    Ok(outcome.status())
}

fn handle_backfill(config: &MonitorConfig, args: BackfillArgs) -> Result<RunStatus, AppError> {
    if args.from > args.to {
        return Err(AppError::new(1, format!("--from {} is after --to {}", args.from, args.to)));
    }
    let pause = Duration::try_from_secs_f64(args.pause_secs)
        .map_err(|_| AppError::new(1, format!("invalid --pause-secs {}", args.pause_secs)))?;

    let transport = transport(config)?;
    let mut ledger = open_ledger(config)?;
    let pipeline = Pipeline::new(config, &transport, &ThreadSleeper);

    let summary = backfill::backfill(
        &pipeline,
        &mut ledger,
        &ThreadSleeper,
        args.from,
        args.to,
        args.force,
        pause,
    );
    print_json(&summary)?;
    Ok(summary.status())
}

fn handle_list(config: &MonitorConfig, args: ListArgs) -> Result<RunStatus, AppError> {
    let transport = transport(config)?;
    let pipeline = Pipeline::new(config, &transport, &ThreadSleeper);

    let refs = pipeline.catalog().list_available()?;
    let skip = args.limit.map_or(0, |n| refs.len().saturating_sub(n));
    print_json(&refs[skip..])?;
    Ok(RunStatus::Success)
}

fn handle_stats(config: &MonitorConfig) -> Result<RunStatus, AppError> {
    let ledger = open_ledger(config)?;
    print_json(&ledger.stats())?;
    Ok(RunStatus::Success)
}

#[derive(Debug, Serialize)]
struct SeriesPoint {
    reference_date: NaiveDate,
    rate: f64,
}

fn handle_series(config: &MonitorConfig, args: SeriesArgs) -> Result<RunStatus, AppError> {
    let ledger = open_ledger(config)?;
    let points: Vec<SeriesPoint> = ledger
        .query(
            &config.country,
            args.maturity,
            args.from.unwrap_or(NaiveDate::MIN),
            args.to.unwrap_or(NaiveDate::MAX),
        )
        .into_iter()
        .map(|(reference_date, rate)| SeriesPoint { reference_date, rate })
        .collect();
    info!(country = %config.country, maturity = args.maturity, points = points.len(), "series loaded");
    print_json(&points)?;
    Ok(RunStatus::Success)
}

fn transport(config: &MonitorConfig) -> Result<ReqwestTransport, AppError> {
    ReqwestTransport::new(config.request_timeout)
        .map_err(|e| AppError::new(1, format!("Failed to build HTTP client: {e}")))
}

fn open_ledger(config: &MonitorConfig) -> Result<CsvLedger, AppError> {
    Ok(CsvLedger::open(config.ledger_path(), &config.maturities, config.lock_timeout)?)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::new(1, format!("Failed to serialize output: {e}")))?;
    println!("{json}");
    Ok(())
}

/// Rewrite argv so `rfr` defaults to `rfr run`.
///
/// Rules:
/// - `rfr`                       -> `rfr run`
/// - `rfr --date 2024-11 ...`    -> `rfr run --date 2024-11 ...`
/// - `rfr --help/--version/-h`   -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("run".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(arg1.as_str(), "-h" | "--help" | "-V" | "--version" | "help");
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg1.as_str(), "run" | "backfill" | "list" | "stats" | "series");
    if is_subcommand {
        return argv;
    }

    // A leading flag means "run flags", unless a subcommand follows later
    // (`rfr --country DE stats`).
    let has_subcommand = argv
        .iter()
        .skip(1)
        .any(|a| matches!(a.as_str(), "run" | "backfill" | "list" | "stats" | "series"));
    if arg1.starts_with('-') && !has_subcommand {
        argv.insert(1, "run".to_string());
    }
    argv
}
