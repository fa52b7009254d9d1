//! Sequential backfill over a range of month ends.

use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info};

use crate::app::pipeline::{Pipeline, RunOutcome, RunStatus};
use crate::data::retry::Sleeper;
use crate::domain::calendar::month_ends_between;
use crate::error::Stage;
use crate::store::HistoricalLedger;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackfillFailure {
    pub reference_date: NaiveDate,
    pub stage: Stage,
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BackfillSummary {
    pub processed: Vec<NaiveDate>,
    pub skipped: Vec<NaiveDate>,
    pub failed: Vec<BackfillFailure>,
}

impl BackfillSummary {
    pub fn status(&self) -> RunStatus {
        if self.failed.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::Failed
        }
    }
}

/// Run the pipeline for every month end in `[from, to]`, pausing between
/// runs. Skips and failures do not stop the walk.
pub fn backfill(
    pipeline: &Pipeline<'_>,
    ledger: &mut dyn HistoricalLedger,
    sleeper: &dyn Sleeper,
    from: NaiveDate,
    to: NaiveDate,
    force: bool,
    pause: Duration,
) -> BackfillSummary {
    let dates = month_ends_between(from, to);
    info!(%from, %to, months = dates.len(), "backfill started");

    let mut summary = BackfillSummary::default();
    for (idx, date) in dates.iter().copied().enumerate() {
        if idx > 0 && !pause.is_zero() {
            sleeper.sleep(pause);
        }

        match pipeline.run(ledger, Some(date), force) {
            Ok(RunOutcome::Processed { comparison, .. }) => {
                summary.processed.push(comparison.current.reference_date);
            }
            Ok(RunOutcome::Skipped { reference_date, .. }) => summary.skipped.push(reference_date),
            Err(err) => {
                error!(%date, stage = %err.stage, kind = err.kind(), "{err}");
                summary.failed.push(BackfillFailure {
                    reference_date: date,
                    stage: err.stage,
                    kind: err.kind(),
                    message: err.to_string(),
                });
            }
        }
    }

    info!(
        processed = summary.processed.len(),
        skipped = summary.skipped.len(),
        failed = summary.failed.len(),
        "backfill finished"
    );
    summary
}
