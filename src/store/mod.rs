//! Historical ledger: one `RateRecord` per `(reference_date, country)`.
//!
//! This module defines:
//!
//! - the `HistoricalLedger` trait (keyed append plus read-side queries)
//! - an in-memory backend (`MemoryLedger`)
//! - the CSV-file backend (`CsvLedger`) with lock-file exclusion and atomic
//!   replacement of the backing file
//!
//! Backends only implement storage (`records`, `append_or_update`). All
//! queries are provided once on the trait and read the ascending record list.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};
use serde::Serialize;

use crate::domain::RateRecord;
use crate::error::{DuplicateRecordError, LedgerError};

pub mod csv_ledger;
pub mod lock;
pub mod memory;

pub use csv_ledger::CsvLedger;
pub use memory::MemoryLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AppendOutcome {
    Inserted,
    /// An existing entry was overwritten.
    Replaced,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerStats {
    pub records: usize,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
    pub countries: Vec<String>,
}

pub trait HistoricalLedger {
    /// All records, ascending by `(reference_date, country)`.
    fn records(&self) -> &[RateRecord];

    /// Insert `record`, or replace the existing entry when `overwrite` is set.
    ///
    /// Without `overwrite`, an existing entry for the same key yields
    /// `LedgerError::Duplicate` and nothing is written.
    fn append_or_update(&mut self, record: RateRecord, overwrite: bool) -> Result<AppendOutcome, LedgerError>;

    fn get(&self, country: &str, reference_date: NaiveDate) -> Option<&RateRecord> {
        self.records()
            .iter()
            .find(|r| r.reference_date == reference_date && same_country(&r.country, country))
    }

    fn contains(&self, country: &str, reference_date: NaiveDate) -> bool {
        self.get(country, reference_date).is_some()
    }

    /// `(date, rate)` pairs for one maturity over `[start, end]`, ascending.
    /// Records without a value at that maturity are left out.
    fn query(&self, country: &str, maturity: u32, start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, f64)> {
        self.records()
            .iter()
            .filter(|r| same_country(&r.country, country))
            .filter(|r| r.reference_date >= start && r.reference_date <= end)
            .filter_map(|r| r.rates.get(&maturity).map(|v| (r.reference_date, *v)))
            .collect()
    }

    /// Record with the greatest reference date strictly before `date`.
    fn latest_before(&self, country: &str, date: NaiveDate) -> Option<&RateRecord> {
        self.records()
            .iter()
            .rev()
            .find(|r| r.reference_date < date && same_country(&r.country, country))
    }

    /// Record with the smallest reference date in calendar year `year`.
    fn earliest_in_year(&self, country: &str, year: i32) -> Option<&RateRecord> {
        self.records()
            .iter()
            .find(|r| r.reference_date.year() == year && same_country(&r.country, country))
    }

    fn countries(&self) -> Vec<String> {
        self.records()
            .iter()
            .map(|r| r.country.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn stats(&self) -> LedgerStats {
        let records = self.records();
        LedgerStats {
            records: records.len(),
            first_date: records.first().map(|r| r.reference_date),
            last_date: records.last().map(|r| r.reference_date),
            countries: self.countries(),
        }
    }
}

fn same_country(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}

/// Apply a keyed insert/replace to an ascending record list.
pub(crate) fn apply_record(
    records: &mut Vec<RateRecord>,
    record: RateRecord,
    overwrite: bool,
) -> Result<AppendOutcome, DuplicateRecordError> {
    let key = |r: &RateRecord| (r.reference_date, r.country.to_ascii_uppercase());
    let target = key(&record);

    match records.binary_search_by(|r| key(r).cmp(&target)) {
        Ok(idx) if overwrite => {
            records[idx] = record;
            Ok(AppendOutcome::Replaced)
        }
        Ok(_) => Err(DuplicateRecordError {
            reference_date: record.reference_date,
            country: record.country,
        }),
        Err(idx) => {
            records.insert(idx, record);
            Ok(AppendOutcome::Inserted)
        }
    }
}


#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::testing::record;
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ledger() -> MemoryLedger {
        let mut ledger = MemoryLedger::new();
        for (date, r10) in [
            (d(2023, 12, 31), 0.0260),
            (d(2024, 1, 31), 0.0250),
            (d(2024, 2, 29), 0.0255),
            (d(2024, 10, 31), 0.0227),
        ] {
            ledger
                .append_or_update(record("FR", date, &[(10, r10)], None), false)
                .unwrap();
        }
        ledger
            .append_or_update(record("DE", d(2024, 1, 31), &[(10, 0.0220)], None), false)
            .unwrap();
        ledger
    }

    #[test]
    fn baselines() {
        let ledger = ledger();
        assert_eq!(
            ledger.latest_before("FR", d(2024, 11, 30)).map(|r| r.reference_date),
            Some(d(2024, 10, 31))
        );
        assert_eq!(
            ledger.latest_before("fr", d(2024, 1, 31)).map(|r| r.reference_date),
            Some(d(2023, 12, 31))
        );
        assert_eq!(
            ledger.earliest_in_year("FR", 2024).map(|r| r.reference_date),
            Some(d(2024, 1, 31))
        );
        assert!(ledger.earliest_in_year("FR", 2022).is_none());
        assert!(ledger.latest_before("DE", d(2024, 1, 31)).is_none());
    }

    #[test]
    fn query_is_inclusive_and_ascending() {
        let series = ledger().query("FR", 10, d(2024, 1, 31), d(2024, 10, 31));
        assert_eq!(
            series,
            vec![(d(2024, 1, 31), 0.0250), (d(2024, 2, 29), 0.0255), (d(2024, 10, 31), 0.0227)]
        );
        assert!(ledger().query("FR", 5, d(2024, 1, 1), d(2024, 12, 31)).is_empty());
    }

    #[test]
    fn duplicate_key_requires_overwrite() {
        let mut ledger = ledger();
        let err = ledger
            .append_or_update(record("FR", d(2024, 1, 31), &[(10, 0.03)], None), false)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Duplicate(ref dup) if dup.country == "FR"));
        assert_eq!(ledger.get("FR", d(2024, 1, 31)).unwrap().rates[&10], 0.0250);

        let outcome = ledger
            .append_or_update(record("FR", d(2024, 1, 31), &[(10, 0.03)], None), true)
            .unwrap();
        assert_eq!(outcome, AppendOutcome::Replaced);
        assert_eq!(ledger.get("FR", d(2024, 1, 31)).unwrap().rates[&10], 0.03);
        assert_eq!(ledger.records().len(), 5);
    }

    #[test]
    fn stats_summarize_the_ledger() {
        assert_eq!(
            ledger().stats(),
            LedgerStats {
                records: 5,
                first_date: Some(d(2023, 12, 31)),
                last_date: Some(d(2024, 10, 31)),
                countries: vec!["DE".to_string(), "FR".to_string()],
            }
        );
        assert_eq!(MemoryLedger::new().stats().records, 0);
    }
}
