use crate::domain::RateRecord;
use crate::error::LedgerError;
use crate::store::{AppendOutcome, HistoricalLedger, apply_record};

/// Ledger held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    records: Vec<RateRecord>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoricalLedger for MemoryLedger {
    fn records(&self) -> &[RateRecord] {
        &self.records
    }

    fn append_or_update(&mut self, record: RateRecord, overwrite: bool) -> Result<AppendOutcome, LedgerError> {
        Ok(apply_record(&mut self.records, record, overwrite)?)
    }
}
