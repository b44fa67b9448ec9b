//! Per-signal extractors.
//!
//! Every extractor validates and records one named signal per event into a
//! worker-local buffer. After the event loop the buffers of all workers are
//! merged by rank and materialized into one Arrow record batch.

use std::collections::BTreeSet;
use std::mem;

use arrow::record_batch::RecordBatch;

use crate::columns;
use crate::error::{Error, Result};
use crate::layout::{LayoutState, RecordLayout};
use crate::source::EventContext;
use crate::value::Row;

pub mod epics;
pub mod event_code;
pub mod roi;
pub mod scalar;
pub mod waveform;

pub use epics::EpicsChannelExtractor;
pub use event_code::EventCodeExtractor;
pub use roi::{ImageRoiExtractor, Roi, RoiStat};
pub use scalar::{FieldKind, FieldRef, ScalarFieldExtractor};
pub use waveform::WaveformIntegralExtractor;

/// Every this many misses an extractor reports its running bad count.
const MISS_REPORT_EVERY: u64 = 20;

pub trait Extractor: Send {
    /// Dataset name; unique within a run.
    fn name(&self) -> &str;

    /// Whether this event carries usable data for this extractor.
    ///
    /// Missing data is an ordinary `false`, counted in [`ExtractorStats::bad`].
    fn validate(&mut self, ctx: &EventContext<'_>) -> bool;

    /// Appends one row for the event just validated.
    fn record(&mut self, ctx: &EventContext<'_>) -> Result<()>;

    fn stats(&self) -> ExtractorStats;

    /// Clears buffered rows and counters.
    fn reset(&mut self);

    /// Hands over the worker-local buffer for gathering.
    fn take_buffer(&mut self) -> ExtractorBuffer;

    /// Replaces the buffer with the rank-ordered concatenation of `buffers`.
    fn merge(&mut self, buffers: Vec<ExtractorBuffer>) -> Result<()>;

    fn materialize(&self) -> Result<RecordBatch>;
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractorStats {
    pub good: u64,
    pub bad: u64,
    pub recorded: u64,
}

impl ExtractorStats {
    fn observe(&mut self, name: &str, ok: bool) -> bool {
        if ok {
            self.good = self.good.saturating_add(1);
        } else {
            self.bad = self.bad.saturating_add(1);
            if self.bad % MISS_REPORT_EVERY == 0 {
                log::debug!("{} no {} events so far on this worker", self.bad, name);
            }
        }
        ok
    }
}

/// One worker's contribution for one extractor.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractorBuffer {
    Rows {
        layout: Option<RecordLayout>,
        rows: Vec<Row>,
    },
    Codes(Vec<Vec<u16>>),
}

impl ExtractorBuffer {
    pub fn len(&self) -> usize {
        match self {
            ExtractorBuffer::Rows { rows, .. } => rows.len(),
            ExtractorBuffer::Codes(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn kind(&self) -> &'static str {
        match self {
            ExtractorBuffer::Rows { .. } => "rows",
            ExtractorBuffer::Codes(_) => "event codes",
        }
    }
}

/// Half-open sample or pixel index range `[start, end)`, never inverted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexWindow {
    start: usize,
    end: usize,
}

impl IndexWindow {
    pub fn new(start: usize, end: usize) -> Result<Self> {
        if start > end {
            return Err(Error::Config(format!(
                "index window start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> usize {
        self.start
    }

    pub fn end(&self) -> usize {
        self.end
    }

    /// The window as a range, or `None` when it does not fit in `0..limit`.
    pub fn within(&self, limit: usize) -> Option<std::ops::Range<usize>> {
        (self.end <= limit).then_some(self.start..self.end)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The window restricted to `0..limit`.
    pub fn clamp(&self, limit: usize) -> std::ops::Range<usize> {
        let end = self.end.min(limit);
        self.start.min(end)..end
    }
}

/// Buffer, layout and counters shared by the row-producing extractors.
#[derive(Debug)]
pub struct RowAccumulator {
    name: String,
    field_names: Vec<String>,
    initial: LayoutState,
    layout: LayoutState,
    placeholder: RecordLayout,
    rows: Vec<Row>,
    pending: Option<Row>,
    stats: ExtractorStats,
    sealed: bool,
}

impl RowAccumulator {
    /// Layout inferred from the first recorded row.
    pub fn inferred(name: impl Into<String>, field_names: Vec<String>) -> Result<Self> {
        let placeholder = RecordLayout::float64(&field_names);
        Self::build(name.into(), field_names, LayoutState::Unresolved, placeholder)
    }

    /// Layout known up front.
    pub fn fixed(name: impl Into<String>, layout: RecordLayout) -> Result<Self> {
        let field_names = layout.fields().iter().map(|f| f.name.clone()).collect();
        Self::build(
            name.into(),
            field_names,
            LayoutState::Resolved(layout.clone()),
            layout,
        )
    }

    fn build(
        name: String,
        field_names: Vec<String>,
        layout: LayoutState,
        placeholder: RecordLayout,
    ) -> Result<Self> {
        let mut seen = BTreeSet::new();
        if let Some(dup) = field_names.iter().find(|field| !seen.insert(field.as_str())) {
            return Err(Error::Config(format!(
                "extractor '{name}' declares field '{dup}' more than once"
            )));
        }
        Ok(Self {
            name,
            field_names,
            initial: layout.clone(),
            layout,
            placeholder,
            rows: Vec::new(),
            pending: None,
            stats: ExtractorStats::default(),
            sealed: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &LayoutState {
        &self.layout
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Stores the row captured during validation for the following record.
    pub fn validate(&mut self, captured: Option<Row>) -> bool {
        let ok = captured.is_some();
        self.pending = captured;
        self.stats.observe(&self.name, ok)
    }

    pub fn record(&mut self) -> Result<()> {
        if self.sealed {
            return Err(Error::Sealed {
                extractor: self.name.clone(),
            });
        }
        let row = self.pending.take().ok_or_else(|| Error::NotValidated {
            extractor: self.name.clone(),
        })?;
        self.layout
            .admit(&self.field_names, &row)
            .map_err(|mismatch| Error::Layout {
                extractor: self.name.clone(),
                mismatch,
            })?;
        self.rows.push(row);
        self.stats.recorded = self.stats.recorded.saturating_add(1);
        Ok(())
    }

    pub fn stats(&self) -> ExtractorStats {
        self.stats
    }

    pub fn reset(&mut self) {
        self.layout = self.initial.clone();
        self.rows.clear();
        self.pending = None;
        self.stats = ExtractorStats::default();
        self.sealed = false;
    }

    pub fn take_buffer(&mut self) -> ExtractorBuffer {
        ExtractorBuffer::Rows {
            layout: self.layout.resolved().cloned(),
            rows: mem::take(&mut self.rows),
        }
    }

    pub fn merge(&mut self, buffers: Vec<ExtractorBuffer>) -> Result<()> {
        let mut merged_layout: Option<RecordLayout> = None;
        let mut merged_rows = Vec::with_capacity(buffers.iter().map(ExtractorBuffer::len).sum());

        for (rank, buffer) in buffers.into_iter().enumerate() {
            let (layout, rows) = match buffer {
                ExtractorBuffer::Rows { layout, rows } => (layout, rows),
                other => {
                    return Err(self.gather_mismatch(
                        rank,
                        format!("expected rows, received {}", other.kind()),
                    ))
                }
            };
            if let Some(layout) = layout {
                if let Some(expected) = merged_layout.as_ref() {
                    expected
                        .check_compatible(&layout)
                        .map_err(|mismatch| self.gather_mismatch(rank, mismatch.to_string()))?;
                } else {
                    merged_layout = Some(layout);
                }
            } else if !rows.is_empty() {
                return Err(self.gather_mismatch(rank, "rows without a layout".to_string()));
            }
            merged_rows.extend(rows);
        }

        if let Some(layout) = merged_layout {
            self.layout = LayoutState::Resolved(layout);
        }
        self.rows = merged_rows;
        self.pending = None;
        self.sealed = true;
        Ok(())
    }

    pub fn materialize(&self) -> Result<RecordBatch> {
        let layout = self.layout.resolved().unwrap_or(&self.placeholder);
        columns::materialize(&self.name, layout, &self.rows)
    }

    fn gather_mismatch(&self, rank: usize, detail: String) -> Error {
        Error::GatherMismatch {
            extractor: self.name.clone(),
            rank,
            detail,
        }
    }
}
