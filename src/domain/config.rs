//! Run configuration.
//!
//! `MonitorConfig` is built once per invocation (environment, optional `.env`,
//! CLI overrides) and then passed by reference to every component. Nothing
//! mutates it afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;

use crate::data::retry::RetryPolicy;
use crate::domain::{Horizon, ValueUnit};
use crate::error::{ConfigError, ThresholdConfigError};

pub const DEFAULT_CATALOG_URL: &str =
    "https://www.eiopa.europa.eu/tools-and-data/risk-free-interest-rate-term-structures_en";
pub const DEFAULT_COUNTRY: &str = "FR";
pub const DEFAULT_MATURITIES: [u32; 5] = [1, 5, 10, 20, 30];
pub const DEFAULT_MOM_THRESHOLD_BPS: f64 = 50.0;
pub const DEFAULT_YTD_THRESHOLD_BPS: f64 = 100.0;
pub const DEFAULT_TABLE_PATTERNS: [&str; 3] = ["*Term_Structures*.xlsx", "*Term_Structures*.csv", "*RFR_spot*.csv"];

/// Environment keys read by `MonitorConfig::from_lookup`.
pub mod keys {
    pub const COUNTRY: &str = "RFR_COUNTRY";
    pub const MATURITIES: &str = "RFR_MATURITIES";
    pub const MOM_BPS: &str = "RFR_ALERT_MOM_BPS";
    pub const YTD_BPS: &str = "RFR_ALERT_YTD_BPS";
    pub const DATA_DIR: &str = "RFR_DATA_DIR";
    pub const CATALOG_URL: &str = "RFR_CATALOG_URL";
    pub const TIMEOUT_SECS: &str = "RFR_TIMEOUT_SECS";
    pub const TABLE_PATTERNS: &str = "RFR_TABLE_PATTERNS";
    pub const RATE_UNIT: &str = "RFR_RATE_UNIT";
    pub const VA_UNIT: &str = "RFR_VA_UNIT";
}

/// Alert thresholds in basis points, validated on construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    mom_bps: f64,
    ytd_bps: f64,
}

impl Thresholds {
    pub fn new(mom_bps: f64, ytd_bps: f64) -> Result<Self, ThresholdConfigError> {
        for (horizon, value) in [("MoM", mom_bps), ("YTD", ytd_bps)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ThresholdConfigError { horizon, value });
            }
        }
        Ok(Self { mom_bps, ytd_bps })
    }

    pub fn for_horizon(&self, horizon: Horizon) -> f64 {
        match horizon {
            Horizon::Mom => self.mom_bps,
            Horizon::Ytd => self.ytd_bps,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            mom_bps: DEFAULT_MOM_THRESHOLD_BPS,
            ytd_bps: DEFAULT_YTD_THRESHOLD_BPS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Jurisdiction code, upper-cased (e.g. `FR`).
    pub country: String,
    /// Tracked maturities in years, ascending and unique.
    pub maturities: Vec<u32>,
    pub thresholds: Thresholds,
    /// Root for cached archives (`raw/`) and the ledger file.
    pub data_dir: PathBuf,
    pub catalog_url: String,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    /// Archive entry name patterns (`*` wildcard), tried in order.
    pub table_patterns: Vec<String>,
    /// Publications quote rates in percent.
    pub rate_unit: ValueUnit,
    /// `Auto` reads the VA header label, else follows the rate unit.
    pub va_unit: ValueUnit,
    /// How long a ledger writer waits for the lock.
    pub lock_timeout: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            country: DEFAULT_COUNTRY.to_string(),
            maturities: DEFAULT_MATURITIES.to_vec(),
            thresholds: Thresholds::default(),
            data_dir: PathBuf::from("data"),
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            request_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            table_patterns: DEFAULT_TABLE_PATTERNS.iter().map(|s| s.to_string()).collect(),
            rate_unit: ValueUnit::Percent,
            va_unit: ValueUnit::Auto,
            lock_timeout: Duration::from_secs(30),
        }
    }
}

impl MonitorConfig {
    /// Build from the process environment (after loading `.env` if present).
    ///
    /// `overrides` (typically CLI flags) take precedence over the environment.
    pub fn from_env<F>(overrides: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| overrides(key).or_else(|| std::env::var(key).ok()))
    }

    /// Build from an arbitrary key lookup; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut config = Self::default();

        if let Some(country) = get(keys::COUNTRY) {
            config.country = parse_country(&country)?;
        }
        if let Some(raw) = get(keys::MATURITIES) {
            config.maturities = parse_maturities(&raw)?;
        }

        let mom = match get(keys::MOM_BPS) {
            Some(raw) => parse_f64(keys::MOM_BPS, &raw)?,
            None => DEFAULT_MOM_THRESHOLD_BPS,
        };
        let ytd = match get(keys::YTD_BPS) {
            Some(raw) => parse_f64(keys::YTD_BPS, &raw)?,
            None => DEFAULT_YTD_THRESHOLD_BPS,
        };
        config.thresholds = Thresholds::new(mom, ytd)?;

        if let Some(dir) = get(keys::DATA_DIR) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(url) = get(keys::CATALOG_URL) {
            url::Url::parse(&url).map_err(|e| ConfigError::invalid(keys::CATALOG_URL, format!("'{url}': {e}")))?;
            config.catalog_url = url;
        }
        if let Some(raw) = get(keys::TIMEOUT_SECS) {
            let secs = raw
                .parse::<u64>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| ConfigError::invalid(keys::TIMEOUT_SECS, format!("'{raw}' is not a positive integer")))?;
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = get(keys::TABLE_PATTERNS) {
            let patterns: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string)
                .collect();
            if !patterns.is_empty() {
                config.table_patterns = patterns;
            }
        }
        if let Some(raw) = get(keys::RATE_UNIT) {
            config.rate_unit = parse_unit(keys::RATE_UNIT, &raw)?;
        }
        if let Some(raw) = get(keys::VA_UNIT) {
            config.va_unit = parse_unit(keys::VA_UNIT, &raw)?;
        }

        Ok(config)
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir.join("raw")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("historical.csv")
    }

    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.data_dir = dir.as_ref().to_path_buf();
        self
    }
}

fn parse_country(raw: &str) -> Result<String, ConfigError> {
    let code = raw.trim().to_ascii_uppercase();
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ConfigError::invalid(keys::COUNTRY, format!("'{raw}' is not a jurisdiction code")));
    }
    Ok(code)
}

/// Parse `1,5,10` (also `1y, 5Y`) into an ascending, de-duplicated list.
pub fn parse_maturities(raw: &str) -> Result<Vec<u32>, ConfigError> {
    let mut out = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let digits = token.trim_end_matches(['y', 'Y']);
        let m = digits
            .parse::<u32>()
            .ok()
            .filter(|m| *m > 0)
            .ok_or_else(|| ConfigError::invalid(keys::MATURITIES, format!("'{token}' is not a maturity in years")))?;
        out.push(m);
    }
    out.sort_unstable();
    out.dedup();
    if out.is_empty() {
        return Err(ConfigError::invalid(keys::MATURITIES, "at least one maturity is required"));
    }
    Ok(out)
}

fn parse_f64(key: &'static str, raw: &str) -> Result<f64, ConfigError> {
    raw.parse::<f64>()
        .map_err(|_| ConfigError::invalid(key, format!("'{raw}' is not a number")))
}

fn parse_unit(key: &'static str, raw: &str) -> Result<ValueUnit, ConfigError> {
    ValueUnit::from_str(raw, true).map_err(|_| ConfigError::invalid(key, format!("unknown unit '{raw}'")))
}
