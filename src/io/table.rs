//! Delimiter sniffing and header location for publication tables.
//!
//! Publications move the header row around (preamble lines, notes) and switch
//! delimiters between releases. Each candidate delimiter is a parsing
//! strategy; a strategy passes when it yields a plausible column count and a
//! header row carrying the marker columns (a jurisdiction column plus at least
//! one maturity column) within the scan window.
//!
//! Spreadsheet sheets arrive as a cell grid with no delimiter to sniff. They
//! go through the same header search, first as laid out and then transposed,
//! since the rate sheets are usually pivoted (one column per jurisdiction,
//! one row per maturity, jurisdiction names in an unlabeled header cell).

use std::collections::BTreeMap;

use csv::{Position, StringRecord};
use tracing::debug;

use crate::error::ParsingError;

/// Delimiter strategies, in preference order.
pub const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Leading rows searched for the header.
pub const HEADER_SCAN_ROWS: usize = 25;

const MIN_COLUMNS: usize = 2;

/// Largest tenor accepted as a maturity label (keeps dates and ids out).
const MAX_MATURITY_YEARS: u32 = 200;

/// Column positions resolved from the header row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub country: usize,
    pub maturities: BTreeMap<u32, usize>,
    pub va: Option<usize>,
    pub reference_date: Option<usize>,
}

impl ColumnMap {
    fn marker_count(&self) -> usize {
        1 + self.maturities.len() + usize::from(self.va.is_some()) + usize::from(self.reference_date.is_some())
    }
}

/// A parsed table: delimiter, header position, column map, and all rows.
#[derive(Debug, Clone)]
pub struct Table {
    pub name: String,
    /// Field delimiter for text tables; `None` for spreadsheet sheets.
    pub delimiter: Option<u8>,
    /// Index into `rows` of the header row.
    pub header_index: usize,
    pub columns: ColumnMap,
    pub rows: Vec<StringRecord>,
}

impl Table {
    /// Rows after the header.
    pub fn data_rows(&self) -> impl Iterator<Item = &StringRecord> {
        self.rows.iter().skip(self.header_index + 1)
    }

    /// Raw header label of column `col`.
    pub fn header_label(&self, col: usize) -> &str {
        self.rows
            .get(self.header_index)
            .and_then(|header| header.get(col))
            .unwrap_or("")
    }

    /// Whether `2,40` may be a decimal comma (anything but comma-delimited text).
    pub fn decimal_comma(&self) -> bool {
        self.delimiter != Some(b',')
    }
}

/// Run every delimiter strategy and keep the one whose output passes the
/// structural checks.
pub fn parse_table(text: &str, name: &str) -> Result<Table, ParsingError> {
    let mut passing: Vec<Table> = Vec::new();
    let mut plausible_rows = 0usize;

    for delimiter in DELIMITER_CANDIDATES {
        let rows = read_rows(text, delimiter);
        let widest = rows.iter().take(HEADER_SCAN_ROWS).map(StringRecord::len).max().unwrap_or(0);
        if widest < MIN_COLUMNS {
            continue;
        }
        plausible_rows = plausible_rows.max(rows.len().min(HEADER_SCAN_ROWS));

        match locate_header(&rows, KeyColumn::Labeled) {
            Some((header_index, columns)) => {
                debug!(
                    table = name,
                    delimiter = %(delimiter as char).escape_default(),
                    header_index,
                    maturities = columns.maturities.len(),
                    "delimiter strategy passed"
                );
                passing.push(Table {
                    name: name.to_string(),
                    delimiter: Some(delimiter),
                    header_index,
                    columns,
                    rows,
                });
            }
            None => debug!(table = name, delimiter = %(delimiter as char).escape_default(), "no header found"),
        }
    }

    if passing.is_empty() {
        if plausible_rows == 0 {
            return Err(ParsingError::DelimiterUndetermined {
                table: name.to_string(),
                detail: format!("no candidate produced at least {MIN_COLUMNS} columns"),
            });
        }
        return Err(ParsingError::HeaderNotFound {
            table: name.to_string(),
            scanned: plausible_rows,
        });
    }

    passing.sort_by_key(|t| std::cmp::Reverse(t.columns.marker_count()));
    if passing.len() > 1 && passing[0].columns.marker_count() == passing[1].columns.marker_count() {
        return Err(ParsingError::DelimiterUndetermined {
            table: name.to_string(),
            detail: format!(
                "ambiguous between '{}' and '{}'",
                (passing[0].delimiter.unwrap_or_default() as char).escape_default(),
                (passing[1].delimiter.unwrap_or_default() as char).escape_default()
            ),
        });
    }

    Ok(passing.swap_remove(0))
}

/// Locate the header in a spreadsheet grid whose top-left cell sits at
/// `origin` (zero-based row, column) on the sheet.
///
/// Row positions carry the sheet row number; in the transposed pass they carry
/// the sheet column number instead.
pub fn parse_grid(cells: &[Vec<String>], origin: (usize, usize), name: &str) -> Result<Table, ParsingError> {
    let rows: Vec<StringRecord> = cells
        .iter()
        .enumerate()
        .map(|(i, row)| record(row.iter().map(String::as_str), origin.0 + i + 1))
        .collect();
    if let Some((header_index, columns)) = locate_header(&rows, KeyColumn::Labeled) {
        debug!(table = name, header_index, "sheet header found");
        return Ok(Table {
            name: name.to_string(),
            delimiter: None,
            header_index,
            columns,
            rows,
        });
    }

    let width = cells.iter().map(Vec::len).max().unwrap_or(0);
    let transposed: Vec<StringRecord> = (0..width)
        .map(|col| {
            let column = cells.iter().map(|row| row.get(col).map_or("", String::as_str));
            record(column, origin.1 + col + 1)
        })
        .collect();
    if let Some((header_index, columns)) = locate_header(&transposed, KeyColumn::Inferred) {
        debug!(table = name, header_index, "pivoted sheet header found");
        return Ok(Table {
            name: name.to_string(),
            delimiter: None,
            header_index,
            columns,
            rows: transposed,
        });
    }

    Err(ParsingError::HeaderNotFound {
        table: name.to_string(),
        scanned: rows.len().max(transposed.len()).min(HEADER_SCAN_ROWS),
    })
}

fn record<'c>(cells: impl Iterator<Item = &'c str>, line: usize) -> StringRecord {
    let mut record: StringRecord = cells.map(str::trim).collect();
    let mut position = Position::new();
    position.set_line(line as u64);
    record.set_position(Some(position));
    record
}

fn read_rows(text: &str, delimiter: u8) -> Vec<StringRecord> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    reader.records().filter_map(Result::ok).collect()
}

/// How the jurisdiction column is recognized in a header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyColumn {
    /// Only by its label (`Country`, `Jurisdiction`, ...).
    Labeled,
    /// By label, or else the unlabeled column holding the most text below the header.
    Inferred,
}

fn locate_header(rows: &[StringRecord], key: KeyColumn) -> Option<(usize, ColumnMap)> {
    rows.iter()
        .take(HEADER_SCAN_ROWS)
        .enumerate()
        .find_map(|(idx, row)| header_columns(row, &rows[idx + 1..], key).map(|cols| (idx, cols)))
}

/// Resolve marker columns in a candidate header row.
fn header_columns(row: &StringRecord, below: &[StringRecord], key: KeyColumn) -> Option<ColumnMap> {
    if row.len() < MIN_COLUMNS {
        return None;
    }

    let mut country = None;
    let mut maturities = BTreeMap::new();
    let mut va = None;
    let mut reference_date = None;

    for (idx, cell) in row.iter().enumerate() {
        let name = normalize_header_name(cell);
        if country.is_none() && is_country_header(&name) {
            country = Some(idx);
        } else if va.is_none() && is_va_header(&name) {
            va = Some(idx);
        } else if reference_date.is_none() && is_date_header(&name) {
            reference_date = Some(idx);
        } else if let Some(m) = parse_maturity_label(cell) {
            maturities.entry(m).or_insert(idx);
        }
    }

    if maturities.is_empty() {
        return None;
    }
    let country = match (country, key) {
        (Some(col), _) => col,
        (None, KeyColumn::Labeled) => return None,
        (None, KeyColumn::Inferred) => infer_key_column(row, below)?,
    };
    Some(ColumnMap {
        country,
        maturities,
        va,
        reference_date,
    })
}

/// The blank-headed column with the most non-numeric cells below the header.
fn infer_key_column(header: &StringRecord, below: &[StringRecord]) -> Option<usize> {
    let text_cells = |col: usize| {
        below
            .iter()
            .filter_map(|row| row.get(col))
            .filter(|cell| !cell.is_empty() && cell.parse::<f64>().is_err())
            .count()
    };
    header
        .iter()
        .enumerate()
        .filter(|(_, label)| label.trim().is_empty())
        .map(|(col, _)| (col, text_cells(col)))
        .filter(|(_, count)| *count > 0)
        .max_by_key(|(col, count)| (*count, std::cmp::Reverse(*col)))
        .map(|(col, _)| col)
}

/// Normalize a header name for comparison.
///
/// Excel exports sometimes prefix the first header with a UTF-8 BOM; spaces,
/// underscores, dashes and unit parentheses vary between releases.
pub fn normalize_header_name(name: &str) -> String {
    name.trim()
        .trim_start_matches('\u{feff}')
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '_' | '-' | '(' | ')'))
        .flat_map(char::to_lowercase)
        .collect()
}

fn is_country_header(name: &str) -> bool {
    matches!(
        name,
        "country"
            | "countrycode"
            | "countryiso"
            | "jurisdiction"
            | "jurisdictioncode"
            | "iso"
            | "isocode"
            | "code"
            | "currency"
            | "ccy"
    )
}

fn is_va_header(name: &str) -> bool {
    matches!(name, "va" | "vabps" | "vainbps") || name.starts_with("volatilityadjustment")
}

fn is_date_header(name: &str) -> bool {
    matches!(
        name,
        "referencedate" | "refdate" | "date" | "asof" | "asofdate" | "valuationdate"
    )
}

/// Parse a maturity column label: `10`, `10y`, `10 Y`, `10 years`, `Y10`,
/// `rate_10y`, `maturity_10`.
pub fn parse_maturity_label(label: &str) -> Option<u32> {
    let name = normalize_header_name(label);
    let mut rest = name.as_str();

    for prefix in ["rate", "maturity", "tenor", "spot"] {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped;
            break;
        }
    }
    if let Some(stripped) = rest.strip_prefix('y') {
        if stripped.starts_with(|c: char| c.is_ascii_digit()) {
            rest = stripped;
        }
    }
    for suffix in ["years", "year", "yrs", "yr", "y"] {
        if let Some(stripped) = rest.strip_suffix(suffix) {
            rest = stripped;
            break;
        }
    }

    if rest.is_empty() {
        return None;
    }
    let years = if rest.chars().all(|c| c.is_ascii_digit()) {
        rest.parse::<u32>().ok()?
    } else {
        let v: f64 = rest.parse().ok()?;
        if v.fract() != 0.0 || v <= 0.0 {
            return None;
        }
        v as u32
    };
    (1..=MAX_MATURITY_YEARS).contains(&years).then_some(years)
}
