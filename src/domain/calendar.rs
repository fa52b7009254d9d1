//! Calendar helpers: month ends, spreadsheet serial dates, loose date parsing.

use chrono::{Datelike, Duration, NaiveDate};

/// Last calendar day of the month containing `date`.
pub fn month_end(date: NaiveDate) -> NaiveDate {
    let (y, m) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    NaiveDate::from_ymd_opt(y, m, 1)
        .and_then(|first_next| first_next.pred_opt())
        .unwrap_or(date)
}

pub fn is_month_end(date: NaiveDate) -> bool {
    month_end(date) == date
}

/// Month-end dates in `[from, to]`, ascending.
pub fn month_ends_between(from: NaiveDate, to: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut cursor = month_end(from);
    while cursor <= to {
        out.push(cursor);
        match cursor.succ_opt() {
            Some(next) => cursor = month_end(next),
            None => break,
        }
    }
    out
}

/// Convert a spreadsheet serial day count (1900 date system) to a date.
///
/// Serial 1 is 1900-01-01. The 1900 system counts a non-existent 1900-02-29
/// (serial 60), so serials from 61 on are one day ahead of a plain day count.
/// Fractional parts (time of day) are ignored. Serial 60 and values < 1 are rejected.
pub fn from_excel_serial(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial > 2_958_465.0 {
        return None;
    }
    let days = serial.trunc() as i64;
    if days == 60 {
        return None;
    }
    let epoch = if days < 60 {
        NaiveDate::from_ymd_opt(1899, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };
    epoch.checked_add_signed(Duration::days(days))
}

/// Parse a calendar date string in one of the formats seen in publications.
pub fn parse_calendar_date(s: &str) -> Option<NaiveDate> {
    const FMTS: [&str; 6] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%Y/%m/%d", "%Y%m%d", "%d.%m.%Y"];
    let s = s.trim();
    FMTS.iter().find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
}

/// Parse a date cell that may be a calendar string or a spreadsheet serial.
///
/// Pure 8-digit values are read as `YYYYMMDD` before being considered serials.
pub fn parse_date_cell(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if let Some(d) = parse_calendar_date(s) {
        return Some(d);
    }
    let serial: f64 = s.parse().ok()?;
    from_excel_serial(serial)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn month_end_handles_leap_years_and_december() {
        assert_eq!(month_end(d(2024, 2, 3)), d(2024, 2, 29));
        assert_eq!(month_end(d(2023, 2, 3)), d(2023, 2, 28));
        assert_eq!(month_end(d(2024, 12, 1)), d(2024, 12, 31));
        assert!(is_month_end(d(2024, 11, 30)));
        assert!(!is_month_end(d(2024, 11, 29)));
    }

    #[test]
    fn month_ends_cross_year_boundary() {
        let ends = month_ends_between(d(2023, 11, 15), d(2024, 2, 29));
        assert_eq!(ends, vec![d(2023, 11, 30), d(2023, 12, 31), d(2024, 1, 31), d(2024, 2, 29)]);
        assert!(month_ends_between(d(2024, 3, 1), d(2024, 3, 30)).is_empty());
    }

    #[test]
    fn excel_serials() {
        assert_eq!(from_excel_serial(1.0), Some(d(1900, 1, 1)));
        assert_eq!(from_excel_serial(59.0), Some(d(1900, 2, 28)));
        assert_eq!(from_excel_serial(60.0), None);
        assert_eq!(from_excel_serial(61.0), Some(d(1900, 3, 1)));
        assert_eq!(from_excel_serial(45657.0), Some(d(2024, 12, 31)));
        assert_eq!(from_excel_serial(45626.75), Some(d(2024, 11, 30)));
        assert_eq!(from_excel_serial(0.0), None);
        assert_eq!(from_excel_serial(f64::NAN), None);
    }

    #[test]
    fn date_cells_accept_strings_and_serials() {
        assert_eq!(parse_date_cell("2024-11-30"), Some(d(2024, 11, 30)));
        assert_eq!(parse_date_cell("30/11/2024"), Some(d(2024, 11, 30)));
        assert_eq!(parse_date_cell("20241130"), Some(d(2024, 11, 30)));
        assert_eq!(parse_date_cell("45626"), Some(d(2024, 11, 30)));
        assert_eq!(parse_date_cell("n/a"), None);
    }
}
