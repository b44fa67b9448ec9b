use arrow::record_batch::RecordBatch;

use super::{Extractor, ExtractorBuffer, ExtractorStats, RowAccumulator};
use crate::error::Result;
use crate::source::EventContext;
use crate::value::Row;

pub const DEFAULT_NAME: &str = "Epics";

/// Slow-control channels sampled at each event; one column per channel.
#[derive(Debug)]
pub struct EpicsChannelExtractor {
    channels: Vec<String>,
    acc: RowAccumulator,
}

impl EpicsChannelExtractor {
    pub fn new(name: impl Into<String>, channels: Vec<String>) -> Result<Self> {
        Ok(Self {
            acc: RowAccumulator::inferred(name, channels.clone())?,
            channels,
        })
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    fn capture(&self, ctx: &EventContext<'_>) -> Option<Row> {
        self.channels
            .iter()
            .map(|channel| ctx.slow_value(channel))
            .collect()
    }
}

impl Extractor for EpicsChannelExtractor {
    fn name(&self) -> &str {
        self.acc.name()
    }

    fn validate(&mut self, ctx: &EventContext<'_>) -> bool {
        let captured = self.capture(ctx);
        self.acc.validate(captured)
    }

    fn record(&mut self, _ctx: &EventContext<'_>) -> Result<()> {
        self.acc.record()
    }

    fn stats(&self) -> ExtractorStats {
        self.acc.stats()
    }

    fn reset(&mut self) {
        self.acc.reset();
    }

    fn take_buffer(&mut self) -> ExtractorBuffer {
        self.acc.take_buffer()
    }

    fn merge(&mut self, buffers: Vec<ExtractorBuffer>) -> Result<()> {
        self.acc.merge(buffers)
    }

    fn materialize(&self) -> Result<RecordBatch> {
        self.acc.materialize()
    }
}
