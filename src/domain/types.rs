//! Shared domain types.
//!
//! These types are intentionally plain and serializable so the downstream
//! reporter can consume them as structured data.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use clap::ValueEnum;
use serde::{Deserialize, Serialize, Serializer};

/// One archive offered by the remote listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteFileRef {
    pub filename: String,
    pub url: String,
    /// Last calendar day of the covered month.
    pub reference_date: NaiveDate,
}

/// A jurisdiction's published values for one reference date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub reference_date: NaiveDate,
    pub country: String,
    /// Maturity in years -> rate as a decimal fraction (0.025 = 2.5%).
    pub rates: BTreeMap<u32, f64>,
    pub volatility_adjustment: Option<f64>,
}

impl RateRecord {
    pub fn value(&self, field: Field) -> Option<f64> {
        match field {
            Field::Rate(m) => self.rates.get(&m).copied(),
            Field::Va => self.volatility_adjustment,
        }
    }
}

/// A compared quantity: the rate at one maturity, or the volatility adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Rate(u32),
    Va,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Field::Rate(m) => write!(f, "rate_{m}y"),
            Field::Va => f.write_str("va"),
        }
    }
}

// Serialized as its column name so it can key JSON maps.
impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Horizon {
    #[serde(rename = "MoM")]
    Mom,
    #[serde(rename = "YTD")]
    Ytd,
}

impl fmt::Display for Horizon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Horizon::Mom => f.write_str("MoM"),
            Horizon::Ytd => f.write_str("YTD"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub field: Field,
    pub horizon: Horizon,
    pub delta_bps: f64,
    pub direction: Direction,
}

/// Per-horizon deltas in basis points.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Deltas {
    pub mom: BTreeMap<Field, f64>,
    pub ytd: BTreeMap<Field, f64>,
}

impl Deltas {
    pub fn get(&self, horizon: Horizon, field: Field) -> Option<f64> {
        match horizon {
            Horizon::Mom => self.mom.get(&field).copied(),
            Horizon::Ytd => self.ytd.get(&field).copied(),
        }
    }
}

/// Output of comparing one record against the ledger. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonResult {
    pub current: RateRecord,
    pub mom_baseline: Option<RateRecord>,
    pub ytd_baseline: Option<RateRecord>,
    pub deltas_bps: Deltas,
    pub alerts: Vec<Alert>,
}

/// Unit convention of numeric cells in a publication table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ValueUnit {
    /// Decide from the table itself (see `io::extract`).
    Auto,
    /// Decimal fraction (0.025 = 2.5%).
    Decimal,
    /// Percent (2.5 = 2.5%).
    Percent,
    /// Basis points (250 = 2.5%).
    Bps,
}

impl ValueUnit {
    /// Factor converting a value in this unit to a decimal fraction.
    ///
    /// `Auto` has no fixed factor; callers resolve it first.
    pub fn to_decimal_factor(self) -> Option<f64> {
        match self {
            ValueUnit::Auto => None,
            ValueUnit::Decimal => Some(1.0),
            ValueUnit::Percent => Some(0.01),
            ValueUnit::Bps => Some(0.0001),
        }
    }
}

/// Known display names for jurisdiction codes, as they appear in publications.
pub fn country_aliases(code: &str) -> &'static [&'static str] {
    match code.to_ascii_uppercase().as_str() {
        "FR" => &["France"],
        "DE" => &["Germany"],
        "IT" => &["Italy"],
        "ES" => &["Spain"],
        "NL" => &["Netherlands"],
        "BE" => &["Belgium"],
        "AT" => &["Austria"],
        "PT" => &["Portugal"],
        "IE" => &["Ireland"],
        "EUR" => &["Euro", "Eurozone"],
        "GB" => &["United Kingdom", "UK"],
        "US" => &["United States", "USA"],
        "CH" => &["Switzerland"],
        _ => &[],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_order_rates_before_va_and_serialize_as_column_names() {
        let mut deltas = BTreeMap::new();
        deltas.insert(Field::Va, 1.0);
        deltas.insert(Field::Rate(10), 2.0);
        deltas.insert(Field::Rate(1), 3.0);
        let keys: Vec<_> = deltas.keys().map(|f| f.to_string()).collect();
        assert_eq!(keys, vec!["rate_1y", "rate_10y", "va"]);

        let json = serde_json::to_string(&deltas).unwrap();
        assert_eq!(json, r#"{"rate_1y":3.0,"rate_10y":2.0,"va":1.0}"#);
    }

    #[test]
    fn record_value_lookup() {
        let record = RateRecord {
            reference_date: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            country: "FR".to_string(),
            rates: BTreeMap::from([(1, 0.024)]),
            volatility_adjustment: None,
        };
        assert_eq!(record.value(Field::Rate(1)), Some(0.024));
        assert_eq!(record.value(Field::Rate(5)), None);
        assert_eq!(record.value(Field::Va), None);
    }
}
