use std::collections::BTreeSet;
use std::mem;

use arrow::record_batch::RecordBatch;

use super::{Extractor, ExtractorBuffer, ExtractorStats};
use crate::columns;
use crate::error::{Error, Result};
use crate::source::EventContext;

pub const DEFAULT_NAME: &str = "EVR";

/// Timing-system event codes.
///
/// Rows are variable-length code sets, so the column set is only known
/// once every worker's rows are in: `materialize` emits one boolean column
/// per code in the union of all recorded sets.
#[derive(Debug)]
pub struct EventCodeExtractor {
    name: String,
    rows: Vec<Vec<u16>>,
    pending: Option<Vec<u16>>,
    stats: ExtractorStats,
    sealed: bool,
}

impl EventCodeExtractor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
            pending: None,
            stats: ExtractorStats::default(),
            sealed: false,
        }
    }

    /// Sorted union of every code recorded so far.
    pub fn observed_codes(&self) -> Vec<u16> {
        let codes: BTreeSet<u16> = self.rows.iter().flatten().copied().collect();
        codes.into_iter().collect()
    }
}

impl Extractor for EventCodeExtractor {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&mut self, ctx: &EventContext<'_>) -> bool {
        self.pending = ctx.event.event_codes().map(|codes| {
            let mut codes = codes.to_vec();
            codes.sort_unstable();
            codes.dedup();
            codes
        });
        self.stats.observe(&self.name, self.pending.is_some())
    }

    fn record(&mut self, _ctx: &EventContext<'_>) -> Result<()> {
        if self.sealed {
            return Err(Error::Sealed {
                extractor: self.name.clone(),
            });
        }
        let codes = self.pending.take().ok_or_else(|| Error::NotValidated {
            extractor: self.name.clone(),
        })?;
        self.rows.push(codes);
        self.stats.recorded = self.stats.recorded.saturating_add(1);
        Ok(())
    }

    fn stats(&self) -> ExtractorStats {
        self.stats
    }

    fn reset(&mut self) {
        self.rows.clear();
        self.pending = None;
        self.stats = ExtractorStats::default();
        self.sealed = false;
    }

    fn take_buffer(&mut self) -> ExtractorBuffer {
        ExtractorBuffer::Codes(mem::take(&mut self.rows))
    }

    fn merge(&mut self, buffers: Vec<ExtractorBuffer>) -> Result<()> {
        let mut merged = Vec::with_capacity(buffers.iter().map(ExtractorBuffer::len).sum());
        for (rank, buffer) in buffers.into_iter().enumerate() {
            match buffer {
                ExtractorBuffer::Codes(rows) => merged.extend(rows),
                other => {
                    return Err(Error::GatherMismatch {
                        extractor: self.name.clone(),
                        rank,
                        detail: format!("expected event codes, received {}", other.kind()),
                    })
                }
            }
        }
        self.rows = merged;
        self.pending = None;
        self.sealed = true;
        Ok(())
    }

    fn materialize(&self) -> Result<RecordBatch> {
        let codes = self.observed_codes();
        let names: Vec<String> = codes.iter().map(u16::to_string).collect();
        columns::boolean_columns(&names, self.rows.len(), |row, col| {
            self.rows[row].binary_search(&codes[col]).is_ok()
        })
    }
}
