//! Command-line parsing for the risk-free rate monitor.
//!
//! Parsing and dispatch live apart from the pipeline: this module only turns
//! argv into typed arguments. Configuration flags are exposed as overrides of
//! the `RFR_*` environment keys, so validation happens in one place
//! (`MonitorConfig::from_lookup`).

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::domain::ValueUnit;
use crate::domain::calendar::month_end;
use crate::domain::config::keys;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "rfr", version, about = "Monthly risk-free rate publication monitor")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Process one publication (the latest by default) and print the comparison as JSON.
    ///
    /// Exit status: 0 processed, 2 already in the ledger (skipped), 1 failure.
    Run(RunArgs),
    /// Process every month end in a date range, one run at a time.
    Backfill(BackfillArgs),
    /// List publications offered by the remote catalog.
    List(ListArgs),
    /// Summarize the local ledger.
    Stats,
    /// Print the ledger time series for one maturity.
    Series(SeriesArgs),
}

/// Overrides for configuration normally read from the environment.
#[derive(Debug, Clone, Default, Args)]
pub struct GlobalArgs {
    /// Jurisdiction code (overrides RFR_COUNTRY).
    #[arg(long, global = true)]
    pub country: Option<String>,

    /// Comma-separated maturities in years, e.g. `1,5,10` (overrides RFR_MATURITIES).
    #[arg(long, global = true)]
    pub maturities: Option<String>,

    /// Month-over-month alert threshold in bps (overrides RFR_ALERT_MOM_BPS).
    #[arg(long, global = true, allow_negative_numbers = true)]
    pub mom_threshold: Option<f64>,

    /// Year-to-date alert threshold in bps (overrides RFR_ALERT_YTD_BPS).
    #[arg(long, global = true, allow_negative_numbers = true)]
    pub ytd_threshold: Option<f64>,

    /// Directory holding `raw/` archives and `historical.csv` (overrides RFR_DATA_DIR).
    #[arg(long, global = true)]
    pub data_dir: Option<String>,

    /// Publication listing page (overrides RFR_CATALOG_URL).
    #[arg(long, global = true)]
    pub catalog_url: Option<String>,

    /// Unit of rate cells (overrides RFR_RATE_UNIT).
    #[arg(long, global = true, value_enum)]
    pub rate_unit: Option<ValueUnit>,

    /// Unit of VA cells (overrides RFR_VA_UNIT).
    #[arg(long, global = true, value_enum)]
    pub va_unit: Option<ValueUnit>,
}

impl GlobalArgs {
    /// Value for an `RFR_*` key, if the matching flag was given.
    pub fn lookup(&self, key: &str) -> Option<String> {
        let unit = |u: &Option<ValueUnit>| {
            u.and_then(|u| u.to_possible_value())
                .map(|v| v.get_name().to_string())
        };
        match key {
            keys::COUNTRY => self.country.clone(),
            keys::MATURITIES => self.maturities.clone(),
            keys::MOM_BPS => self.mom_threshold.map(|v| v.to_string()),
            keys::YTD_BPS => self.ytd_threshold.map(|v| v.to_string()),
            keys::DATA_DIR => self.data_dir.clone(),
            keys::CATALOG_URL => self.catalog_url.clone(),
            keys::RATE_UNIT => unit(&self.rate_unit),
            keys::VA_UNIT => unit(&self.va_unit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Reference date (`YYYY-MM-DD`, or `YYYY-MM` for that month's end).
    #[arg(long, value_parser = parse_date_arg)]
    pub date: Option<NaiveDate>,

    /// Re-download and overwrite an existing ledger entry.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Args)]
pub struct BackfillArgs {
    /// First month (inclusive).
    #[arg(long, value_parser = parse_date_arg)]
    pub from: NaiveDate,

    /// Last month (inclusive).
    #[arg(long, value_parser = parse_date_arg)]
    pub to: NaiveDate,

    /// Pause between runs, in seconds.
    #[arg(long, default_value_t = 2.0)]
    pub pause_secs: f64,

    /// Re-download and overwrite existing ledger entries.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Args)]
pub struct ListArgs {
    /// Only show the N most recent publications.
    #[arg(long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Args)]
pub struct SeriesArgs {
    /// Maturity in years.
    #[arg(long)]
    pub maturity: u32,

    #[arg(long, value_parser = parse_date_arg)]
    pub from: Option<NaiveDate>,

    #[arg(long, value_parser = parse_date_arg)]
    pub to: Option<NaiveDate>,
}

/// Accept `YYYY-MM-DD`, `YYYYMMDD`, or `YYYY-MM` (month end).
pub fn parse_date_arg(raw: &str) -> Result<NaiveDate, String> {
    let raw = raw.trim();
    for fmt in ["%Y-%m-%d", "%Y%m%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, fmt) {
            return Ok(date);
        }
    }
    NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d")
        .map(month_end)
        .map_err(|_| format!("'{raw}' is not a date (expected YYYY-MM-DD or YYYY-MM)"))
}
