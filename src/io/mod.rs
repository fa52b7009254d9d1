//! Publication table handling.
//!
//! - delimiter and header detection (`table`)
//! - archive extraction into a `RateRecord` (`extract`)

pub mod extract;
pub mod table;

pub use extract::Extractor;
