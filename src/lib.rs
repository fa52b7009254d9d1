//! `rfr-monitor` library crate.
//!
//! The binary (`rfr`) is a thin wrapper around this library so that:
//!
//! - the pipeline is testable without spawning processes or touching the network
//! - each stage (catalog, download, extraction, ledger, analysis) is reusable
//! - code stays easy to navigate as the project grows

pub mod analysis;
pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod io;
pub mod store;
