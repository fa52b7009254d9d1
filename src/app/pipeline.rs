//! The monthly run: DISCOVER -> DOWNLOAD -> EXTRACT -> PERSIST -> ANALYZE.
//!
//! Each stage is gated on the previous one. A failure aborts the run for that
//! reference date with a `PipelineError` naming the stage; nothing is written
//! to the ledger unless extraction produced a complete record.
//!
//! The network transport and the sleeper are injected, so the whole flow can
//! run against scripted responses in tests.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, info_span};

use crate::analysis::Analyzer;
use crate::data::{Artifact, Downloader, FetchSource, SourceCatalog};
use crate::data::http::Transport;
use crate::data::retry::Sleeper;
use crate::domain::{ComparisonResult, MonitorConfig};
use crate::error::{LedgerError, PipelineError, Stage};
use crate::io::Extractor;
use crate::store::{AppendOutcome, HistoricalLedger};

/// How a run ended, as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    /// The reference date was already in the ledger.
    Skipped,
    Failed,
}

impl RunStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            RunStatus::Success => 0,
            RunStatus::Failed => 1,
            RunStatus::Skipped => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunOutcome {
    Processed {
        artifact: Artifact,
        fetched: FetchSource,
        ledger: AppendOutcome,
        comparison: ComparisonResult,
    },
    Skipped {
        reference_date: NaiveDate,
        country: String,
    },
}

impl RunOutcome {
    pub fn status(&self) -> RunStatus {
        match self {
            RunOutcome::Processed { .. } => RunStatus::Success,
            RunOutcome::Skipped { .. } => RunStatus::Skipped,
        }
    }
}

pub struct Pipeline<'a> {
    config: &'a MonitorConfig,
    transport: &'a dyn Transport,
    sleeper: &'a dyn Sleeper,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a MonitorConfig, transport: &'a dyn Transport, sleeper: &'a dyn Sleeper) -> Self {
        Self {
            config,
            transport,
            sleeper,
        }
    }

    pub fn catalog(&self) -> SourceCatalog<'_> {
        SourceCatalog::new(self.transport, self.sleeper, &self.config.retry, &self.config.catalog_url)
    }

    /// Process `target` (or the latest publication when `None`).
    ///
    /// Without `force`, a date already in the ledger is skipped right after
    /// discovery. With `force`, the archive is re-downloaded and the ledger
    /// entry overwritten.
    pub fn run(
        &self,
        ledger: &mut dyn HistoricalLedger,
        target: Option<NaiveDate>,
        force: bool,
    ) -> Result<RunOutcome, PipelineError> {
        let config = self.config;
        let _span = info_span!("run", country = %config.country).entered();

        info!(stage = %Stage::Discover, target = ?target, "stage started");
        let file = match target {
            Some(date) => self.catalog().find_by_date(date),
            None => self.catalog().latest(),
        }
        .map_err(|e| PipelineError::new(Stage::Discover, target, e))?;
        let reference_date = file.reference_date;
        info!(stage = %Stage::Discover, %reference_date, file = %file.filename, "stage complete");

        if !force && ledger.contains(&config.country, reference_date) {
            info!(%reference_date, "already processed, skipping (use --force to reprocess)");
            return Ok(RunOutcome::Skipped {
                reference_date,
                country: config.country.clone(),
            });
        }

        info!(stage = %Stage::Download, %reference_date, "stage started");
        let fetched = Downloader::new(self.transport, self.sleeper, &config.retry, config.raw_dir())
            .fetch(&file, force)
            .map_err(|e| PipelineError::new(Stage::Download, Some(reference_date), e))?;

        info!(stage = %Stage::Extract, %reference_date, "stage started");
        let record = Extractor::new(config)
            .extract(&fetched.artifact, &config.country, &config.maturities)
            .map_err(|e| PipelineError::new(Stage::Extract, Some(reference_date), e))?;

        info!(stage = %Stage::Persist, reference_date = %record.reference_date, "stage started");
        let appended = match ledger.append_or_update(record.clone(), force) {
            Ok(outcome) => outcome,
            Err(LedgerError::Duplicate(dup)) => {
                info!(reference_date = %dup.reference_date, "already processed, skipping");
                return Ok(RunOutcome::Skipped {
                    reference_date: dup.reference_date,
                    country: dup.country,
                });
            }
            Err(e) => return Err(PipelineError::new(Stage::Persist, Some(record.reference_date), e)),
        };

        info!(stage = %Stage::Analyze, reference_date = %record.reference_date, "stage started");
        let comparison = Analyzer::new(config).compare(&record, &*ledger);

        Ok(RunOutcome::Processed {
            artifact: fetched.artifact,
            fetched: fetched.source,
            ledger: appended,
            comparison,
        })
    }
}
