//! Archive extraction into a `RateRecord`.
//!
//! The pipeline is strict: a record is returned only when every configured
//! maturity produced a plausible value in a known unit. The volatility
//! adjustment is the one optional field; problems with it are logged and
//! leave it absent.
//!
//! Spreadsheet entries (`.xlsx`, `.xls`) are read with calamine; the preferred
//! sheet is `RFR_spot_no_VA`, else the first one. Delimited text entries go
//! through the delimiter strategies in `io::table`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use chrono::NaiveDate;
use csv::StringRecord;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::data::Artifact;
use crate::domain::calendar::{month_end, parse_date_cell};
use crate::domain::{Field, MonitorConfig, RateRecord, ValueUnit, country_aliases};
use crate::error::{ExtractError, ExtractionError, ParsingError};
use crate::io::table::{Table, parse_grid, parse_table};

/// Spreadsheet entry extensions.
pub const SHEET_EXTENSIONS: [&str; 2] = ["xlsx", "xls"];

/// Delimited text entry extensions.
pub const TEXT_EXTENSIONS: [&str; 3] = ["csv", "tsv", "txt"];

/// Sheet holding the spot rates without VA, preferred when present.
pub const RATE_SHEET: &str = "RFR_spot_no_VA";

/// Plausible range for a rate, as a decimal fraction.
pub const RATE_BOUNDS: (f64, f64) = (-0.05, 0.15);

/// Plausible range for the volatility adjustment, as a decimal fraction.
pub const VA_BOUNDS: (f64, f64) = (-0.02, 0.02);

pub struct Extractor<'a> {
    table_patterns: &'a [String],
    rate_unit: ValueUnit,
    va_unit: ValueUnit,
}

impl<'a> Extractor<'a> {
    pub fn new(config: &'a MonitorConfig) -> Self {
        Self {
            table_patterns: &config.table_patterns,
            rate_unit: config.rate_unit,
            va_unit: config.va_unit,
        }
    }

    pub fn extract(&self, artifact: &Artifact, country: &str, maturities: &[u32]) -> Result<RateRecord, ExtractError> {
        let (entry, bytes) = read_table_entry(&artifact.path, self.table_patterns)?;
        debug!(entry = %entry, bytes = bytes.len(), "table entry selected");

        let table = if has_extension(&entry, &SHEET_EXTENSIONS) {
            let (sheet, cells, origin) = read_sheet(bytes, &entry)?;
            parse_grid(&cells, origin, &format!("{entry}[{sheet}]"))?
        } else {
            parse_table(&decode_text(bytes), &entry)?
        };

        let row = find_country_row(&table, country).ok_or_else(|| ExtractionError::CountryNotFound {
            country: country.to_string(),
            table: table.name.clone(),
        })?;
        let line = row_line(row);

        let (rates, rate_unit) = self.read_rates(&table, row, line, maturities)?;
        let volatility_adjustment = self.read_va(&table, row, line, rate_unit);
        let reference_date = reference_date(&table, row, line, artifact.reference_date)?;

        info!(
            country,
            %reference_date,
            table = %table.name,
            row = line,
            maturities = rates.len(),
            ?rate_unit,
            va = volatility_adjustment.is_some(),
            "record extracted"
        );

        Ok(RateRecord {
            reference_date,
            country: country.to_ascii_uppercase(),
            rates,
            volatility_adjustment,
        })
    }

    fn read_rates(
        &self,
        table: &Table,
        row: &StringRecord,
        line: usize,
        maturities: &[u32],
    ) -> Result<(BTreeMap<u32, f64>, ValueUnit), ParsingError> {
        let mut cells = Vec::with_capacity(maturities.len());
        for &m in maturities {
            let field = Field::Rate(m).to_string();
            let Some(&col) = table.columns.maturities.get(&m) else {
                return Err(ParsingError::InvalidValue {
                    field,
                    row: line,
                    reason: format!("no column for maturity {m}y in header"),
                });
            };
            let cell = parse_cell(row.get(col).unwrap_or(""), table.decimal_comma()).map_err(|reason| {
                ParsingError::InvalidValue {
                    field,
                    row: line,
                    reason,
                }
            })?;
            cells.push((m, cell));
        }

        let unit = resolve_rate_unit(self.rate_unit, &cells, line)?;
        debug!(?unit, "rate unit resolved");

        let mut rates = BTreeMap::new();
        for (m, cell) in cells {
            let value = cell.to_decimal(unit);
            if !in_bounds(value, RATE_BOUNDS) {
                return Err(ParsingError::InvalidValue {
                    field: Field::Rate(m).to_string(),
                    row: line,
                    reason: format!(
                        "{value} outside plausible range [{}, {}]",
                        RATE_BOUNDS.0, RATE_BOUNDS.1
                    ),
                });
            }
            rates.insert(m, value);
        }
        Ok((rates, unit))
    }

    fn read_va(&self, table: &Table, row: &StringRecord, line: usize, rate_unit: ValueUnit) -> Option<f64> {
        let col = table.columns.va?;
        let raw = row.get(col).unwrap_or("").trim();
        if raw.is_empty() {
            warn!(row = line, "empty VA cell, treating as absent");
            return None;
        }

        let cell = match parse_cell(raw, table.decimal_comma()) {
            Ok(cell) => cell,
            Err(reason) => {
                warn!(row = line, %reason, "unparsable VA cell, treating as absent");
                return None;
            }
        };
        let unit = resolve_va_unit(self.va_unit, table.header_label(col), rate_unit);
        let value = cell.to_decimal(unit);
        if !in_bounds(value, VA_BOUNDS) {
            warn!(row = line, value, ?unit, "VA outside plausible range, treating as absent");
            return None;
        }
        Some(value)
    }
}

/// Open the archive and read the primary table entry.
fn read_table_entry(path: &Path, patterns: &[String]) -> Result<(String, Vec<u8>), ExtractionError> {
    let archive_err = |message: String| ExtractionError::Archive {
        path: path.to_path_buf(),
        message,
    };

    let file = File::open(path).map_err(|e| archive_err(e.to_string()))?;
    let mut archive = ZipArchive::new(file).map_err(|e| archive_err(e.to_string()))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(|e| archive_err(e.to_string()))?;
        if !entry.is_dir() {
            entries.push(entry.name().to_string());
        }
    }

    let Some(name) = select_table_entry(&entries, patterns) else {
        return Err(ExtractionError::NoTableFound { entries });
    };

    let mut entry = archive.by_name(&name).map_err(|e| archive_err(e.to_string()))?;
    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .map_err(|e| archive_err(format!("reading '{name}': {e}")))?;
    Ok((name, bytes))
}

/// First table entry matching a pattern (patterns tried in order), else the
/// first spreadsheet, else the first text table.
pub fn select_table_entry(entries: &[String], patterns: &[String]) -> Option<String> {
    let tables: Vec<&String> = entries
        .iter()
        .filter(|e| !e.starts_with("__MACOSX/") && is_table(e))
        .collect();

    patterns
        .iter()
        .find_map(|p| tables.iter().find(|e| wildcard_match(p, basename(e))))
        .or_else(|| tables.iter().find(|e| has_extension(e, &SHEET_EXTENSIONS)))
        .or_else(|| tables.first())
        .map(|e| (*e).clone())
}

fn basename(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    basename(name)
        .rsplit_once('.')
        .is_some_and(|(_, ext)| extensions.iter().any(|t| ext.eq_ignore_ascii_case(t)))
}

fn is_table(name: &str) -> bool {
    has_extension(name, &SHEET_EXTENSIONS) || has_extension(name, &TEXT_EXTENSIONS)
}

/// Case-insensitive glob match supporting `*` and `?`.
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.to_lowercase().chars().collect();
    let t: Vec<char> = text.to_lowercase().chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<usize> = None;
    let mut resume = 0;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            resume = ti;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            resume += 1;
            ti = resume;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

/// Load the rate sheet as a text grid: `(sheet name, cells, origin)`, where
/// `origin` is the zero-based (row, column) of the grid's top-left cell.
fn read_sheet(bytes: Vec<u8>, entry: &str) -> Result<(String, Vec<Vec<String>>, (usize, usize)), ExtractionError> {
    let workbook_err = |message: String| ExtractionError::Workbook {
        entry: entry.to_string(),
        message,
    };

    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| workbook_err(e.to_string()))?;
    let names = workbook.sheet_names();
    let sheet = names
        .iter()
        .find(|n| n.eq_ignore_ascii_case(RATE_SHEET))
        .or_else(|| names.first())
        .cloned()
        .ok_or_else(|| workbook_err("workbook has no sheets".to_string()))?;
    if !sheet.eq_ignore_ascii_case(RATE_SHEET) {
        warn!(entry, %sheet, expected = RATE_SHEET, "rate sheet not found, using first sheet");
    }

    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| workbook_err(format!("sheet '{sheet}': {e}")))?;
    let origin = range.start().map_or((0, 0), |(r, c)| (r as usize, c as usize));
    let cells = range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();
    Ok((sheet, cells, origin))
}

/// Cell content as the text a delimited export would carry. Dates become
/// their serial number.
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) | Data::DateTimeIso(s) => s.trim().to_string(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        _ => String::new(),
    }
}

/// UTF-8 when valid, Latin-1 otherwise. A leading BOM is dropped.
fn decode_text(bytes: Vec<u8>) -> String {
    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            debug!("table is not valid UTF-8, decoding as Latin-1");
            e.into_bytes().into_iter().map(char::from).collect()
        }
    };
    match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    }
}

fn find_country_row<'t>(table: &'t Table, country: &str) -> Option<&'t StringRecord> {
    let aliases = country_aliases(country);
    table.data_rows().find(|row| {
        row.get(table.columns.country).is_some_and(|cell| {
            let cell = cell.trim();
            cell.eq_ignore_ascii_case(country) || aliases.iter().any(|a| cell.eq_ignore_ascii_case(a))
        })
    })
}

fn row_line(row: &StringRecord) -> usize {
    row.position().map(|p| p.line() as usize).unwrap_or(0)
}

/// The table's own date, moved to its month end, when it has one. It must
/// fall in the archive's month.
fn reference_date(
    table: &Table,
    row: &StringRecord,
    line: usize,
    archive_date: NaiveDate,
) -> Result<NaiveDate, ParsingError> {
    let Some(col) = table.columns.reference_date else {
        return Ok(archive_date);
    };
    let raw = row.get(col).unwrap_or("").trim();
    if raw.is_empty() {
        return Ok(archive_date);
    }
    let Some(date) = parse_date_cell(raw) else {
        warn!(row = line, cell = raw, "unparsable reference date, using archive date");
        return Ok(archive_date);
    };

    let date = month_end(date);
    if date != month_end(archive_date) {
        return Err(ParsingError::InvalidValue {
            field: "reference_date".to_string(),
            row: line,
            reason: format!("table date '{raw}' falls in another month than the archive ({archive_date})"),
        });
    }
    Ok(date)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Cell {
    value: f64,
    /// The cell carried an explicit `%` suffix.
    percent: bool,
}

impl Cell {
    fn to_decimal(self, unit: ValueUnit) -> f64 {
        let factor = if self.percent {
            0.01
        } else {
            unit.to_decimal_factor().unwrap_or(1.0)
        };
        round_fraction(self.value * factor)
    }
}

fn parse_cell(raw: &str, decimal_comma: bool) -> Result<Cell, String> {
    let trimmed = raw.trim();
    let percent = trimmed.ends_with('%');
    let cleaned: String = trimmed
        .trim_end_matches('%')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return Err("empty cell".to_string());
    }

    let normalized = if decimal_comma && cleaned.contains(',') && !cleaned.contains('.') {
        cleaned.replacen(',', ".", 1)
    } else {
        cleaned
    };
    normalized
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|value| Cell { value, percent })
        .ok_or_else(|| format!("non-numeric value '{trimmed}'"))
}

/// A configured unit is used as is. `Auto` settles on percent only when some
/// value without a `%` suffix cannot be a decimal fraction; otherwise the row
/// fits both readings and is rejected.
fn resolve_rate_unit(configured: ValueUnit, cells: &[(u32, Cell)], line: usize) -> Result<ValueUnit, ParsingError> {
    if configured != ValueUnit::Auto {
        return Ok(configured);
    }
    let bare: Vec<&(u32, Cell)> = cells.iter().filter(|(_, c)| !c.percent).collect();
    let Some((first, _)) = bare.first() else {
        return Ok(ValueUnit::Percent);
    };
    if bare.iter().any(|(_, c)| !in_bounds(c.value, RATE_BOUNDS)) {
        return Ok(ValueUnit::Percent);
    }
    Err(ParsingError::InvalidValue {
        field: Field::Rate(*first).to_string(),
        row: line,
        reason: "rate unit is ambiguous (values read as both decimal and percent); set the rate unit explicitly"
            .to_string(),
    })
}

/// A configured unit is used as is. `Auto` reads the unit off the header
/// label (`VA (bps)`, `VA %`) and otherwise follows the table's rate unit.
fn resolve_va_unit(configured: ValueUnit, label: &str, rate_unit: ValueUnit) -> ValueUnit {
    if configured != ValueUnit::Auto {
        return configured;
    }
    let label = label.to_ascii_lowercase();
    if label.contains("bps") || label.contains("bp)") || label.contains("basis") {
        ValueUnit::Bps
    } else if label.contains('%') || label.contains("percent") || label.contains("pct") {
        ValueUnit::Percent
    } else {
        rate_unit
    }
}

fn in_bounds(value: f64, (lo, hi): (f64, f64)) -> bool {
    (lo..=hi).contains(&value)
}

// Strips unit-conversion noise (2.45 * 0.01 = 0.024500000000000004).
fn round_fraction(value: f64) -> f64 {
    (value * 1e12).round() / 1e12
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;
    use rust_xlsxwriter::Workbook;
    use zip::write::SimpleFileOptions;

    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn write_zip(dir: &Path, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = dir.join("rfr_20241130.zip");
        let mut zip = zip::ZipWriter::new(File::create(&path).unwrap());
        for (name, body) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(body).unwrap();
        }
        zip.finish().unwrap();
        path
    }

    /// Workbook with one sheet per `(name, rows)`; numeric-looking cells are
    /// written as numbers.
    fn workbook(sheets: &[(&str, &[&[&str]])]) -> Vec<u8> {
        let mut workbook = Workbook::new();
        for (name, rows) in sheets {
            let sheet = workbook.add_worksheet();
            sheet.set_name(*name).unwrap();
            for (r, row) in rows.iter().enumerate() {
                for (c, cell) in row.iter().enumerate() {
                    let (r, c) = (r as u32, c as u16);
                    match cell.parse::<f64>() {
                        Ok(v) => sheet.write_number(r, c, v).map(|_| ()),
                        Err(_) if cell.is_empty() => Ok(()),
                        Err(_) => sheet.write_string(r, c, *cell).map(|_| ()),
                    }
                    .unwrap();
                }
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    fn artifact(path: PathBuf) -> Artifact {
        Artifact {
            path,
            reference_date: d(2024, 11, 30),
            filename: "EIOPA_RFR_20241130.zip".to_string(),
        }
    }

    fn extract_with(
        config: &MonitorConfig,
        entries: &[(&str, &[u8])],
        maturities: &[u32],
    ) -> Result<RateRecord, ExtractError> {
        let dir = tempfile::tempdir().unwrap();
        let path = write_zip(dir.path(), entries);
        Extractor::new(config).extract(&artifact(path), "FR", maturities)
    }

    fn extract(entries: &[(&str, &[u8])], maturities: &[u32]) -> Result<RateRecord, ExtractError> {
        extract_with(&MonitorConfig::default(), entries, maturities)
    }

    fn with_units(rate_unit: ValueUnit, va_unit: ValueUnit) -> MonitorConfig {
        MonitorConfig {
            rate_unit,
            va_unit,
            ..MonitorConfig::default()
        }
    }

    const PERCENT_TABLE: &str = "\
country,1y,5y,10y,20y,30y,va
DE,2.21,2.15,2.30,2.45,2.50,0.19
FR,2.40,2.51,2.855,2.90,2.95,0.21
";

    const DECIMAL_TABLE: &str = "\
country,1y,5y,10y,20y,30y,va
DE,0.0221,0.0215,0.0230,0.0245,0.0250,0.0019
FR,0.0240,0.0251,0.02855,0.0290,0.0295,0.0021
";

    #[test]
    fn extracts_percent_row_with_va() {
        let record = extract(
            &[("EIOPA_RFR_20241130_Term_Structures.csv", PERCENT_TABLE.as_bytes())],
            &[1, 5, 10, 20, 30],
        )
        .unwrap();

        assert_eq!(record.reference_date, d(2024, 11, 30));
        assert_eq!(record.country, "FR");
        assert_eq!(
            record.rates,
            BTreeMap::from([(1, 0.024), (5, 0.0251), (10, 0.02855), (20, 0.029), (30, 0.0295)])
        );
        assert_eq!(record.volatility_adjustment, Some(0.0021));
    }

    #[test]
    fn decimal_unit_applies_to_rates_and_unlabeled_va() {
        let config = with_units(ValueUnit::Decimal, ValueUnit::Auto);
        let record = extract_with(&config, &[("t.csv", DECIMAL_TABLE.as_bytes())], &[1, 10]).unwrap();
        assert_eq!(record.rates, BTreeMap::from([(1, 0.024), (10, 0.02855)]));
        assert_eq!(record.volatility_adjustment, Some(0.0021));
    }

    #[test]
    fn low_rate_percent_row_is_read_as_percent_by_default() {
        let record = extract(&[("t.csv", b"country,1,5,10\nFR,-0.04,0.05,0.12\n")], &[1, 5, 10]).unwrap();
        assert_eq!(record.rates, BTreeMap::from([(1, -0.0004), (5, 0.0005), (10, 0.0012)]));
    }

    #[test]
    fn auto_rate_unit_rejects_rows_that_fit_both_units() {
        let config = with_units(ValueUnit::Auto, ValueUnit::Auto);
        let err = extract_with(&config, &[("t.csv", b"country,1,5,10\nFR,-0.04,0.05,0.12\n")], &[1, 5, 10])
            .unwrap_err();
        match err {
            ExtractError::Parsing(ParsingError::InvalidValue { field, row, reason }) => {
                assert_eq!(field, "rate_1y");
                assert_eq!(row, 2);
                assert!(reason.contains("ambiguous"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }

        let record = extract_with(&config, &[("t.csv", b"country,1,10\nFR,0.10,2.855\n")], &[1, 10]).unwrap();
        assert_eq!(record.rates, BTreeMap::from([(1, 0.001), (10, 0.02855)]));
    }

    #[test]
    fn va_unit_comes_from_header_or_rate_unit_not_magnitude() {
        let record = extract(&[("t.csv", b"country,1,10,va\nFR,2.40,2.85,0.03\n")], &[1, 10]).unwrap();
        assert_eq!(record.volatility_adjustment, Some(0.0003));

        let record = extract(&[("t.csv", b"country,1,10,VA (bps)\nFR,2.40,2.85,3\n")], &[1, 10]).unwrap();
        assert_eq!(record.volatility_adjustment, Some(0.0003));

        let config = with_units(ValueUnit::Percent, ValueUnit::Bps);
        let record = extract_with(&config, &[("t.csv", b"country,1,va\nFR,2.40,21\n")], &[1]).unwrap();
        assert_eq!(record.volatility_adjustment, Some(0.0021));
    }

    #[test]
    fn semicolon_table_with_preamble_alias_and_serial_date() {
        let table = "\
Risk-free rates without VA
\u{20}
Jurisdiction;Reference date;1;5;10;VA (bps)
Germany;45626;2,21;2,15;2,30;19
France;45626;2,40;2,51;2,855;21
";
        let record = extract(&[("rates/RFR_spot_no_VA.csv", table.as_bytes())], &[1, 10]).unwrap();
        assert_eq!(record.reference_date, d(2024, 11, 30));
        assert_eq!(record.rates, BTreeMap::from([(1, 0.024), (10, 0.02855)]));
        assert_eq!(record.volatility_adjustment, Some(0.0021));
    }

    #[test]
    fn table_date_is_moved_to_month_end() {
        let record = extract(&[("t.csv", b"country,date,1,10\nFR,2024-11-05,2.40,2.85\n")], &[1, 10]).unwrap();
        assert_eq!(record.reference_date, d(2024, 11, 30));
    }

    #[test]
    fn table_date_in_another_month_is_rejected() {
        // 45631 is 2024-12-05, a publication date rather than the covered month.
        let err = extract(&[("t.csv", b"country,date,1,10\nFR,45631,2.40,2.85\n")], &[1, 10]).unwrap_err();
        match err {
            ExtractError::Parsing(ParsingError::InvalidValue { field, row, .. }) => {
                assert_eq!(field, "reference_date");
                assert_eq!(row, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn latin1_table_is_decoded() {
        let mut bytes = b"Pays,Country,1,5\n".to_vec();
        bytes.extend_from_slice(b"R\xe9publique fran\xe7aise,FR,2.4,2.5\n");
        let record = extract(&[("data.csv", &bytes)], &[1, 5]).unwrap();
        assert_eq!(record.rates.get(&5), Some(&0.025));
        assert_eq!(record.volatility_adjustment, None);
    }

    #[test]
    fn pattern_match_wins_over_first_table_entry() {
        let decoy = "country,1\nFR,9\n";
        let record = extract(
            &[
                ("README.txt", decoy.as_bytes()),
                ("EIOPA_RFR_20241130_Term_Structures.csv", PERCENT_TABLE.as_bytes()),
            ],
            &[1],
        )
        .unwrap();
        assert_eq!(record.rates.get(&1), Some(&0.024));
    }

    #[test]
    fn pivoted_rate_sheet_is_preferred_over_csv() {
        let book = workbook(&[
            ("Main menu", &[&["EIOPA risk-free rates"]]),
            (
                "RFR_spot_no_VA",
                &[
                    &["", "Main menu"],
                    &["", "", "Euro", "France", "Germany"],
                    &["", "Coupon_freq", "1", "1", "1"],
                    &["", "VA", "21", "21", "21"],
                    &["", "1", "3.36", "2.4", "2.21"],
                    &["", "10", "2.9", "2.855", "2.3"],
                ],
            ),
        ]);
        let config = with_units(ValueUnit::Percent, ValueUnit::Bps);
        let record = extract_with(
            &config,
            &[
                ("EIOPA_RFR_20241130_Term_Structures.csv", PERCENT_TABLE.as_bytes()),
                ("EIOPA_RFR_20241130_Term_Structures.xlsx", &book),
            ],
            &[1, 10],
        )
        .unwrap();
        assert_eq!(record.rates, BTreeMap::from([(1, 0.024), (10, 0.02855)]));
        assert_eq!(record.volatility_adjustment, Some(0.0021));
    }

    #[test]
    fn row_laid_out_sheet_with_serial_date() {
        let book = workbook(&[(
            "Rates",
            &[
                &["Country", "Reference date", "1", "10", "VA (bps)"],
                &["DE", "45626", "2.21", "2.3", "19"],
                &["FR", "45626", "2.4", "2.855", "21"],
            ],
        )]);
        let record = extract(&[("rates.xlsx", &book)], &[1, 10]).unwrap();
        assert_eq!(record.reference_date, d(2024, 11, 30));
        assert_eq!(record.rates, BTreeMap::from([(1, 0.024), (10, 0.02855)]));
        assert_eq!(record.volatility_adjustment, Some(0.0021));
    }

    #[test]
    fn unreadable_workbook_is_an_extraction_error() {
        let err = extract(&[("EIOPA_RFR_Term_Structures.xlsx", b"not a workbook")], &[1]).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::Extraction(ExtractionError::Workbook { ref entry, .. }) if entry == "EIOPA_RFR_Term_Structures.xlsx"
        ));
    }

    #[test]
    fn archive_without_tables_is_no_table_found() {
        let err = extract(&[("docs/notes.pdf", b"%PDF")], &[1]).unwrap_err();
        match err {
            ExtractError::Extraction(ExtractionError::NoTableFound { entries }) => {
                assert_eq!(entries, vec!["docs/notes.pdf".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn garbage_archive_is_an_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rfr_20241130.zip");
        std::fs::write(&path, b"<html>not a zip</html>").unwrap();
        let config = MonitorConfig::default();
        let err = Extractor::new(&config).extract(&artifact(path), "FR", &[1]).unwrap_err();
        assert!(matches!(err, ExtractError::Extraction(ExtractionError::Archive { .. })));
    }

    #[test]
    fn missing_country_row() {
        let err = extract(&[("t.csv", b"country,1\nDE,2.1\n")], &[1]).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::Extraction(ExtractionError::CountryNotFound { ref country, .. }) if country == "FR"
        ));
    }

    #[test]
    fn missing_maturity_column_names_field_and_row() {
        let err = extract(&[("t.csv", PERCENT_TABLE.as_bytes())], &[1, 15]).unwrap_err();
        match err {
            ExtractError::Parsing(ParsingError::InvalidValue { field, row, .. }) => {
                assert_eq!(field, "rate_15y");
                assert_eq!(row, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_or_non_numeric_rate_fails_the_extraction() {
        let err = extract(&[("t.csv", b"country,1,5\nFR,2.4,\n")], &[1, 5]).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::Parsing(ParsingError::InvalidValue { ref field, ref reason, .. })
                if field == "rate_5y" && reason == "empty cell"
        ));

        let err = extract(&[("t.csv", b"country,1,5\nFR,2.4,n/a\n")], &[1, 5]).unwrap_err();
        assert!(matches!(err, ExtractError::Parsing(ParsingError::InvalidValue { .. })));
    }

    #[test]
    fn implausible_rate_is_rejected() {
        let err = extract(&[("t.csv", b"country,1,5\nFR,2.4,25\n")], &[1, 5]).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::Parsing(ParsingError::InvalidValue { ref field, .. }) if field == "rate_5y"
        ));
    }

    #[test]
    fn bad_va_is_absent_not_fatal() {
        for va in ["", "n/a", "5%"] {
            let table = format!("country,1,va\nFR,2.4,{va}\n");
            let record = extract(&[("t.csv", table.as_bytes())], &[1]).unwrap();
            assert_eq!(record.volatility_adjustment, None, "va cell {va:?}");
        }
    }

    #[test]
    fn explicit_percent_suffix_overrides_the_unit() {
        let config = with_units(ValueUnit::Decimal, ValueUnit::Auto);
        let record = extract_with(&config, &[("t.csv", b"country,1,5\nFR,2.40%,0.025\n")], &[1, 5]).unwrap();
        assert_eq!(record.rates, BTreeMap::from([(1, 0.024), (5, 0.025)]));
    }

    #[test]
    fn wildcard_matching() {
        assert!(wildcard_match("*Term_Structures*.csv", "EIOPA_RFR_20241130_term_structures.CSV"));
        assert!(wildcard_match("rfr_??.csv", "RFR_01.csv"));
        assert!(!wildcard_match("*Term_Structures*.csv", "Term_Structures.xlsx"));
        assert!(wildcard_match("*", ""));
    }

    #[test]
    fn table_entry_selection_prefers_sheets_and_skips_resource_forks() {
        let entries = vec![
            "__MACOSX/._rates.csv".to_string(),
            "doc.pdf".to_string(),
            "sub/rates.TSV".to_string(),
            "sub/Term_Structures.XLSX".to_string(),
        ];
        assert_eq!(select_table_entry(&entries, &[]), Some("sub/Term_Structures.XLSX".to_string()));
        assert_eq!(select_table_entry(&entries[..3], &[]), Some("sub/rates.TSV".to_string()));
        assert_eq!(select_table_entry(&entries[..2], &[]), None);
        assert_eq!(
            select_table_entry(&entries, &["*.tsv".to_string()]),
            Some("sub/rates.TSV".to_string())
        );
    }
}
