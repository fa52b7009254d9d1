//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - remote references and extracted records (`RemoteFileRef`, `RateRecord`)
//! - comparison outputs (`ComparisonResult`, `Alert`, `Deltas`)
//! - the immutable run configuration (`MonitorConfig`)
//! - calendar helpers (month ends, spreadsheet serial dates)

pub mod calendar;
pub mod config;
pub mod types;

pub use config::{MonitorConfig, Thresholds};
pub use types::*;
