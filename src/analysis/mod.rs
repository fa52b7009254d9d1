//! Month-over-month and year-to-date comparison against the ledger.
//!
//! Baselines:
//! - MoM: the latest record strictly before the current reference date
//! - YTD: the earliest record in the current calendar year, unless that is
//!   the current record itself
//!
//! Deltas are in basis points and rounded to 1e-6 bps, so a move of exactly
//! the threshold never alerts (alerts are strict `>`).

use std::collections::BTreeMap;

use chrono::Datelike;
use tracing::{info, warn};

use crate::domain::{
    Alert, ComparisonResult, Deltas, Direction, Field, Horizon, MonitorConfig, RateRecord, Thresholds,
};
use crate::store::HistoricalLedger;

const BPS_PER_UNIT: f64 = 10_000.0;
const DELTA_PRECISION: f64 = 1e6;

pub struct Analyzer<'a> {
    maturities: &'a [u32],
    thresholds: Thresholds,
}

impl<'a> Analyzer<'a> {
    pub fn new(config: &'a MonitorConfig) -> Self {
        Self {
            maturities: &config.maturities,
            thresholds: config.thresholds,
        }
    }

    pub fn compare(&self, current: &RateRecord, ledger: &dyn HistoricalLedger) -> ComparisonResult {
        let mom_baseline = ledger
            .latest_before(&current.country, current.reference_date)
            .cloned();
        let ytd_baseline = ledger
            .earliest_in_year(&current.country, current.reference_date.year())
            .filter(|r| r.reference_date != current.reference_date)
            .cloned();

        let deltas_bps = Deltas {
            mom: self.deltas(current, mom_baseline.as_ref()),
            ytd: self.deltas(current, ytd_baseline.as_ref()),
        };

        let mut alerts = Vec::new();
        for (horizon, deltas) in [(Horizon::Mom, &deltas_bps.mom), (Horizon::Ytd, &deltas_bps.ytd)] {
            let threshold = self.thresholds.for_horizon(horizon);
            for (&field, &delta_bps) in deltas {
                if delta_bps.abs() > threshold {
                    let direction = if delta_bps > 0.0 { Direction::Up } else { Direction::Down };
                    warn!(
                        country = %current.country,
                        reference_date = %current.reference_date,
                        %field,
                        %horizon,
                        delta_bps,
                        threshold,
                        "threshold exceeded"
                    );
                    alerts.push(Alert {
                        field,
                        horizon,
                        delta_bps,
                        direction,
                    });
                }
            }
        }

        info!(
            country = %current.country,
            reference_date = %current.reference_date,
            mom_baseline = ?mom_baseline.as_ref().map(|r| r.reference_date),
            ytd_baseline = ?ytd_baseline.as_ref().map(|r| r.reference_date),
            alerts = alerts.len(),
            "comparison complete"
        );

        ComparisonResult {
            current: current.clone(),
            mom_baseline,
            ytd_baseline,
            deltas_bps,
            alerts,
        }
    }

    fn deltas(&self, current: &RateRecord, baseline: Option<&RateRecord>) -> BTreeMap<Field, f64> {
        let Some(baseline) = baseline else {
            return BTreeMap::new();
        };

        self.maturities
            .iter()
            .map(|&m| Field::Rate(m))
            .chain(std::iter::once(Field::Va))
            .filter_map(|field| {
                let now = current.value(field)?;
                let then = baseline.value(field)?;
                Some((field, delta_bps(now, then)))
            })
            .collect()
    }
}

/// `(current - baseline)` in basis points, rounded to 1e-6 bps.
pub fn delta_bps(current: f64, baseline: f64) -> f64 {
    ((current - baseline) * BPS_PER_UNIT * DELTA_PRECISION).round() / DELTA_PRECISION
}
