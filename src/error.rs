//! Error taxonomy.
//!
//! Each pipeline component returns its own error type so a failure always
//! names the expectation that was violated (which column, which row, which
//! stage). The binary collapses everything into `AppError`, which only carries
//! a message and a process exit code.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use crate::data::http::TransportError;

/// Top-level error surfaced by the `rfr` binary.
///
/// Exit code 2 belongs to a skipped run, so every error here exits with 1.
#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::new(1, format!("Invalid configuration: {err}"))
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        AppError::new(1, err.to_string())
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        AppError::new(1, format!("Ledger error: {err}"))
    }
}

impl From<DiscoveryError> for AppError {
    fn from(err: DiscoveryError) -> Self {
        AppError::new(1, format!("Discovery failed: {err}"))
    }
}

/// The remote listing could not be turned into file references.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("listing {url} unreachable: {source}")]
    Unreachable {
        url: String,
        #[source]
        source: TransportError,
    },
    #[error("listing {url} contained no parsable archive links")]
    NoEntries { url: String },
    #[error("no archive listed for {target} (closest: {closest:?})")]
    NotListed {
        target: NaiveDate,
        closest: Option<NaiveDate>,
    },
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download of {url} failed after {attempts} attempt(s): {last}")]
    Exhausted {
        url: String,
        attempts: usize,
        last: TransportError,
    },
    #[error("download of {url} rejected: {source}")]
    Rejected {
        url: String,
        #[source]
        source: TransportError,
    },
    #[error("download of {url} returned an empty body")]
    EmptyBody { url: String },
    #[error("failed to store artifact '{}': {source}", .path.display())]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("archive '{}' unreadable: {message}", .path.display())]
    Archive { path: PathBuf, message: String },
    #[error("no table entry found in archive (entries: {entries:?})")]
    NoTableFound { entries: Vec<String> },
    #[error("spreadsheet '{entry}' unreadable: {message}")]
    Workbook { entry: String, message: String },
    #[error("no row for country '{country}' in table '{table}'")]
    CountryNotFound { country: String, table: String },
}

#[derive(Debug, Error)]
pub enum ParsingError {
    #[error("could not determine field delimiter for table '{table}': {detail}")]
    DelimiterUndetermined { table: String, detail: String },
    #[error("header row not found in the first {scanned} rows of '{table}'")]
    HeaderNotFound { table: String, scanned: usize },
    #[error("invalid value for {field} at row {row}: {reason}")]
    InvalidValue {
        field: String,
        row: usize,
        reason: String,
    },
}

/// Any failure of the extraction stage.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Parsing(#[from] ParsingError),
}

/// The ledger already holds an entry for this key and overwrite was not requested.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ledger already holds {country} @ {reference_date}")]
pub struct DuplicateRecordError {
    pub reference_date: NaiveDate,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid {horizon} alert threshold {value} (must be finite and >= 0)")]
pub struct ThresholdConfigError {
    pub horizon: &'static str,
    pub value: f64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Threshold(#[from] ThresholdConfigError),
    #[error("{key}: {message}")]
    Invalid { key: &'static str, message: String },
}

impl ConfigError {
    pub fn invalid(key: &'static str, message: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key,
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Duplicate(#[from] DuplicateRecordError),
    #[error("ledger I/O on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger '{}' line {line}: {message}", .path.display())]
    Corrupt {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("could not acquire ledger lock '{}' within {waited_ms}ms", .path.display())]
    LockTimeout { path: PathBuf, waited_ms: u128 },
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    Discover,
    Download,
    Extract,
    Persist,
    Analyze,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Discover => "DISCOVER",
            Stage::Download => "DOWNLOAD",
            Stage::Extract => "EXTRACT",
            Stage::Persist => "PERSIST",
            Stage::Analyze => "ANALYZE",
        };
        f.write_str(s)
    }
}

/// The originating failure of a stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Parsing(#[from] ParsingError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<ExtractError> for StageError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Extraction(e) => StageError::Extraction(e),
            ExtractError::Parsing(e) => StageError::Parsing(e),
        }
    }
}

impl StageError {
    /// Stable name of the error kind, for logs and batch summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            StageError::Discovery(_) => "DiscoveryError",
            StageError::Download(_) => "DownloadError",
            StageError::Extraction(_) => "ExtractionError",
            StageError::Parsing(_) => "ParsingError",
            StageError::Ledger(LedgerError::Duplicate(_)) => "DuplicateRecordError",
            StageError::Ledger(_) => "LedgerError",
        }
    }
}

/// A run aborted at `stage`; the ledger is untouched for `reference_date`.
#[derive(Debug, Error)]
#[error("{stage} failed{}: {source}", .reference_date.map(|d| format!(" for {d}")).unwrap_or_default())]
pub struct PipelineError {
    pub stage: Stage,
    pub reference_date: Option<NaiveDate>,
    #[source]
    pub source: StageError,
}

impl PipelineError {
    pub fn new(stage: Stage, reference_date: Option<NaiveDate>, source: impl Into<StageError>) -> Self {
        Self {
            stage,
            reference_date,
            source: source.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        self.source.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_error_names_stage_and_date() {
        let err = PipelineError::new(
            Stage::Extract,
            NaiveDate::from_ymd_opt(2024, 11, 30),
            ExtractionError::CountryNotFound {
                country: "FR".to_string(),
                table: "rfr.csv".to_string(),
            },
        );
        let msg = err.to_string();
        assert!(msg.starts_with("EXTRACT failed for 2024-11-30"), "{msg}");
        assert!(msg.contains("'FR'"));
        assert_eq!(err.kind(), "ExtractionError");
    }

    #[test]
    fn configuration_errors_do_not_look_like_a_skip() {
        let err = AppError::from(ConfigError::Threshold(ThresholdConfigError {
            horizon: "MoM",
            value: -1.0,
        }));
        assert_eq!(err.exit_code(), 1);
        assert!(err.to_string().contains("MoM"));

        let err = AppError::from(ConfigError::invalid("RFR_MATURITIES", "empty"));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn duplicate_is_reported_as_its_own_kind() {
        let dup = DuplicateRecordError {
            reference_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            country: "FR".to_string(),
        };
        let err = StageError::Ledger(LedgerError::Duplicate(dup));
        assert_eq!(err.kind(), "DuplicateRecordError");
    }
}
