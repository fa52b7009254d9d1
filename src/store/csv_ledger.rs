//! CSV-file ledger backend.
//!
//! On-disk layout: header `reference_date,country,rate_<m>y...,va`, one row
//! per `(reference_date, country)`, ascending. Absent values are empty cells.
//!
//! Every write takes the lock file, re-reads the file, applies the change and
//! replaces the file atomically (temp file in the same directory, then
//! rename). The file is never edited in place.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use chrono::NaiveDate;
use regex::Regex;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::domain::RateRecord;
use crate::error::LedgerError;
use crate::store::lock::LedgerLock;
use crate::store::{AppendOutcome, HistoricalLedger, apply_record};

const DATE_FORMAT: &str = "%Y-%m-%d";

static RATE_COLUMN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^rate_(\d+)y$").expect("rate column pattern is valid"));

#[derive(Debug)]
pub struct CsvLedger {
    path: PathBuf,
    /// Maturities always written as columns, even when no record has them yet.
    maturities: Vec<u32>,
    lock_timeout: Duration,
    records: Vec<RateRecord>,
}

impl CsvLedger {
    /// Open the ledger at `path`. A missing file is an empty ledger.
    pub fn open(path: impl Into<PathBuf>, maturities: &[u32], lock_timeout: Duration) -> Result<Self, LedgerError> {
        let path = path.into();
        let records = load(&path)?;
        debug!(path = %path.display(), records = records.len(), "ledger loaded");
        Ok(Self {
            path,
            maturities: maturities.to_vec(),
            lock_timeout,
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl HistoricalLedger for CsvLedger {
    fn records(&self) -> &[RateRecord] {
        &self.records
    }

    fn append_or_update(&mut self, record: RateRecord, overwrite: bool) -> Result<AppendOutcome, LedgerError> {
        let _lock = LedgerLock::acquire(&LedgerLock::path_for(&self.path), self.lock_timeout)?;

        // Another invocation may have written since we loaded.
        let mut records = load(&self.path)?;
        let key = (record.reference_date, record.country.clone());

        let outcome = match apply_record(&mut records, record, overwrite) {
            Ok(outcome) => outcome,
            Err(dup) => {
                self.records = records;
                return Err(dup.into());
            }
        };

        write(&self.path, &records, &self.maturities)?;
        info!(
            path = %self.path.display(),
            reference_date = %key.0,
            country = %key.1,
            ?outcome,
            "ledger updated"
        );
        self.records = records;
        Ok(outcome)
    }
}

fn load(path: &Path) -> Result<Vec<RateRecord>, LedgerError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(LedgerError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let corrupt = |line: usize, message: String| LedgerError::Corrupt {
        path: path.to_path_buf(),
        line,
        message,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);

    let headers = reader.headers().map_err(|e| corrupt(1, e.to_string()))?.clone();
    let columns = LedgerColumns::from_headers(&headers).map_err(|message| corrupt(1, message))?;

    let mut records: Vec<RateRecord> = Vec::new();
    for result in reader.records() {
        let row = result.map_err(|e| {
            let line = e.position().map(|p| p.line() as usize).unwrap_or(0);
            corrupt(line, e.to_string())
        })?;
        let line = row.position().map(|p| p.line() as usize).unwrap_or(0);
        let record = columns.parse_row(&row).map_err(|message| corrupt(line, message))?;

        if apply_record(&mut records, record, false).is_err() {
            return Err(corrupt(line, "duplicate (reference_date, country) entry".to_string()));
        }
    }
    Ok(records)
}

/// Column positions of a ledger file header.
struct LedgerColumns {
    reference_date: usize,
    country: usize,
    rates: BTreeMap<u32, usize>,
    va: Option<usize>,
}

impl LedgerColumns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self, String> {
        let position = |name: &str| headers.iter().position(|h| h.trim_start_matches('\u{feff}') == name);

        let reference_date = position("reference_date").ok_or("missing 'reference_date' column")?;
        let country = position("country").ok_or("missing 'country' column")?;
        let va = position("va");

        let mut rates = BTreeMap::new();
        for (idx, header) in headers.iter().enumerate() {
            if let Some(m) = RATE_COLUMN_RE
                .captures(header)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())
            {
                rates.insert(m, idx);
            }
        }

        Ok(Self {
            reference_date,
            country,
            rates,
            va,
        })
    }

    fn parse_row(&self, row: &csv::StringRecord) -> Result<RateRecord, String> {
        let raw_date = row.get(self.reference_date).unwrap_or("");
        let reference_date = NaiveDate::parse_from_str(raw_date, DATE_FORMAT)
            .map_err(|e| format!("bad reference_date '{raw_date}': {e}"))?;

        let country = row.get(self.country).unwrap_or("").to_string();
        if country.is_empty() {
            return Err("empty country".to_string());
        }

        let mut rates = BTreeMap::new();
        for (&m, &idx) in &self.rates {
            if let Some(v) = parse_optional(row.get(idx), &format!("rate_{m}y"))? {
                rates.insert(m, v);
            }
        }
        let volatility_adjustment = match self.va {
            Some(idx) => parse_optional(row.get(idx), "va")?,
            None => None,
        };

        Ok(RateRecord {
            reference_date,
            country,
            rates,
            volatility_adjustment,
        })
    }
}

fn parse_optional(cell: Option<&str>, column: &str) -> Result<Option<f64>, String> {
    match cell.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse::<f64>()
            .map(Some)
            .map_err(|_| format!("bad {column} value '{s}'")),
    }
}

fn write(path: &Path, records: &[RateRecord], maturities: &[u32]) -> Result<(), LedgerError> {
    let io_err = |source: io::Error| LedgerError::Io {
        path: path.to_path_buf(),
        source,
    };
    let csv_err = |e: csv::Error| io_err(io::Error::other(e));

    let columns: BTreeSet<u32> = maturities
        .iter()
        .copied()
        .chain(records.iter().flat_map(|r| r.rates.keys().copied()))
        .collect();

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(io_err)?;
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;

    {
        let mut writer = csv::Writer::from_writer(tmp.as_file_mut());

        let mut header = vec!["reference_date".to_string(), "country".to_string()];
        header.extend(columns.iter().map(|m| format!("rate_{m}y")));
        header.push("va".to_string());
        writer.write_record(&header).map_err(csv_err)?;

        for record in records {
            let mut row = vec![
                record.reference_date.format(DATE_FORMAT).to_string(),
                record.country.clone(),
            ];
            row.extend(columns.iter().map(|m| format_value(record.rates.get(m).copied())));
            row.push(format_value(record.volatility_adjustment));
            writer.write_record(&row).map_err(csv_err)?;
        }
        writer.flush().map_err(io_err)?;
    }

    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

fn format_value(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::store::testing::record;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    const TIMEOUT: Duration = Duration::from_secs(1);

    #[test]
    fn writes_header_and_rows_then_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("historical.csv");
        let mut ledger = CsvLedger::open(&path, &[1, 10], TIMEOUT).unwrap();
        assert!(ledger.records().is_empty());

        ledger
            .append_or_update(record("FR", d(2024, 11, 30), &[(1, 0.024), (10, 0.02855)], Some(0.0021)), false)
            .unwrap();
        ledger
            .append_or_update(record("FR", d(2024, 10, 31), &[(1, 0.0231), (10, 0.0227)], None), false)
            .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "reference_date,country,rate_1y,rate_10y,va\n\
             2024-10-31,FR,0.0231,0.0227,\n\
             2024-11-30,FR,0.024,0.02855,0.0021\n"
        );
        assert!(!LedgerLock::path_for(&path).exists());

        let reopened = CsvLedger::open(&path, &[1, 10], TIMEOUT).unwrap();
        assert_eq!(reopened.records(), ledger.records());
    }

    #[test]
    fn duplicate_without_overwrite_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("historical.csv");
        let mut ledger = CsvLedger::open(&path, &[10], TIMEOUT).unwrap();
        ledger
            .append_or_update(record("FR", d(2024, 11, 30), &[(10, 0.02855)], None), false)
            .unwrap();
        let before = fs::read_to_string(&path).unwrap();

        let err = ledger
            .append_or_update(record("FR", d(2024, 11, 30), &[(10, 0.03)], None), false)
            .unwrap_err();
        assert!(matches!(err, LedgerError::Duplicate(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), before);

        let outcome = ledger
            .append_or_update(record("FR", d(2024, 11, 30), &[(10, 0.03)], None), true)
            .unwrap();
        assert_eq!(outcome, AppendOutcome::Replaced);
        assert_eq!(
            CsvLedger::open(&path, &[10], TIMEOUT).unwrap().records()[0].rates[&10],
            0.03
        );
    }

    #[test]
    fn concurrent_writer_rows_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("historical.csv");
        let mut first = CsvLedger::open(&path, &[10], TIMEOUT).unwrap();
        let mut second = CsvLedger::open(&path, &[10], TIMEOUT).unwrap();

        first
            .append_or_update(record("FR", d(2024, 10, 31), &[(10, 0.0227)], None), false)
            .unwrap();
        second
            .append_or_update(record("FR", d(2024, 11, 30), &[(10, 0.02855)], None), false)
            .unwrap();

        let reopened = CsvLedger::open(&path, &[10], TIMEOUT).unwrap();
        assert_eq!(reopened.records().len(), 2);
    }

    #[test]
    fn unknown_columns_are_ignored_and_new_maturities_extend_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("historical.csv");
        fs::write(&path, "reference_date,country,rate_5y,note,va\n2024-01-31,FR,0.025,hand-edited,\n").unwrap();

        let mut ledger = CsvLedger::open(&path, &[10], TIMEOUT).unwrap();
        assert_eq!(ledger.records()[0].rates, BTreeMap::from([(5, 0.025)]));

        ledger
            .append_or_update(record("FR", d(2024, 2, 29), &[(10, 0.026)], None), false)
            .unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("reference_date,country,rate_5y,rate_10y,va\n"), "{text}");
    }

    #[test]
    fn malformed_rows_report_their_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("historical.csv");
        fs::write(
            &path,
            "reference_date,country,rate_10y,va\n2024-01-31,FR,0.025,\n31/02/2024,FR,0.026,\n",
        )
        .unwrap();

        let err = CsvLedger::open(&path, &[10], TIMEOUT).unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { line: 3, .. }), "{err}");

        fs::write(&path, "date,rate\n").unwrap();
        let err = CsvLedger::open(&path, &[10], TIMEOUT).unwrap_err();
        assert!(matches!(err, LedgerError::Corrupt { line: 1, .. }));
    }

    #[test]
    fn held_lock_times_out_the_writer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("historical.csv");
        let _held = LedgerLock::acquire(&LedgerLock::path_for(&path), Duration::ZERO).unwrap();

        let mut ledger = CsvLedger::open(&path, &[10], Duration::from_millis(100)).unwrap();
        let err = ledger
            .append_or_update(record("FR", d(2024, 11, 30), &[(10, 0.02855)], None), false)
            .unwrap_err();
        assert!(matches!(err, LedgerError::LockTimeout { .. }));
        assert!(!path.exists());
    }
}
