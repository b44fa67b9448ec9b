use arrow::record_batch::RecordBatch;
use serde::Deserialize;

use super::{Extractor, ExtractorBuffer, ExtractorStats, RowAccumulator};
use crate::error::Result;
use crate::source::EventContext;
use crate::value::Row;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    #[default]
    Attribute,
    Accessor,
}

/// One declared field of a detector object.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldRef {
    pub name: String,
    #[serde(default)]
    pub kind: FieldKind,
}

impl FieldRef {
    pub fn attribute(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Attribute,
        }
    }

    pub fn accessor(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Accessor,
        }
    }
}

/// Pulls a static list of attributes and accessor results off one detector object.
#[derive(Debug)]
pub struct ScalarFieldExtractor {
    source: String,
    fields: Vec<FieldRef>,
    acc: RowAccumulator,
}

impl ScalarFieldExtractor {
    pub fn new(
        name: impl Into<String>,
        source: impl Into<String>,
        fields: Vec<FieldRef>,
    ) -> Result<Self> {
        let names = fields.iter().map(|f| f.name.clone()).collect();
        Ok(Self {
            source: source.into(),
            fields,
            acc: RowAccumulator::inferred(name, names)?,
        })
    }

    fn capture(&self, ctx: &EventContext<'_>) -> Option<Row> {
        let detector = ctx.event.detector(&self.source)?;
        self.fields
            .iter()
            .map(|field| match field.kind {
                FieldKind::Attribute => detector.attribute(&field.name),
                FieldKind::Accessor => detector.accessor(&field.name),
            })
            .collect()
    }
}

impl Extractor for ScalarFieldExtractor {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::source::{DetectorRecord, EventTime, MemoryEvent, SlowControlLog};
    use arrow::array::{Array, FixedSizeListArray, Float64Array, Int64Array};

    fn ebeam_event(charge: f64, fiducial: i64) -> MemoryEvent {
        MemoryEvent::new().with_detector(
            "BldInfo(EBeam)",
            DetectorRecord::new()
                .with_attribute("ebeamCharge", charge)
                .with_accessor("fiducials", fiducial)
                .with_accessor("position", vec![0.5, -0.5]),
        )
    }

    fn extractor() -> ScalarFieldExtractor {
        ScalarFieldExtractor::new(
            "ebeam",
            "BldInfo(EBeam)",
            vec![
                FieldRef::attribute("ebeamCharge"),
                FieldRef::accessor("fiducials"),
                FieldRef::accessor("position"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn records_declared_fields_in_order() {
        let slow = SlowControlLog::new();
        let mut ext = extractor();
        for (i, charge) in [0.25, 0.5].into_iter().enumerate() {
            let event = ebeam_event(charge, i as i64);
            let ctx = EventContext::new(EventTime(i as u64), &event, &slow);
            assert!(ext.validate(&ctx));
            ext.record(&ctx).expect("record");
        }

        let batch = ext.materialize().expect("materialize");
        assert_eq!(batch.num_rows(), 2);
        let charge = batch
            .column(0)
            .as_any()
            .downcast_ref::<Float64Array>()
            .unwrap();
        assert_eq!(charge.value(1), 0.5);
        let fiducials = batch
            .column(1)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(fiducials.value(1), 1);
        let position = batch
            .column(2)
            .as_any()
            .downcast_ref::<FixedSizeListArray>()
            .unwrap();
        assert_eq!(position.value_length(), 2);
    }

    #[test]
    fn missing_detector_or_field_is_not_an_error() {
        let slow = SlowControlLog::new();
        let mut ext = extractor();

        let empty = MemoryEvent::new();
        assert!(!ext.validate(&EventContext::new(EventTime(0), &empty, &slow)));

        let partial = MemoryEvent::new().with_detector(
            "BldInfo(EBeam)",
            DetectorRecord::new().with_attribute("ebeamCharge", 1.0),
        );
        assert!(!ext.validate(&EventContext::new(EventTime(1), &partial, &slow)));
        assert_eq!(ext.stats().bad, 2);
    }

    #[test]
    fn type_change_after_first_record_is_fatal() {
        let slow = SlowControlLog::new();
        let mut ext = extractor();

        let first = ebeam_event(0.25, 1);
        let ctx = EventContext::new(EventTime(0), &first, &slow);
        assert!(ext.validate(&ctx));
        ext.record(&ctx).unwrap();

        let changed = MemoryEvent::new().with_detector(
            "BldInfo(EBeam)",
            DetectorRecord::new()
                .with_attribute("ebeamCharge", 3i64)
                .with_accessor("fiducials", 2i64)
                .with_accessor("position", vec![0.0, 0.0]),
        );
        let ctx = EventContext::new(EventTime(1), &changed, &slow);
        assert!(ext.validate(&ctx));
        let err = ext.record(&ctx).unwrap_err();
        assert!(matches!(err, Error::Layout { ref extractor, .. } if extractor == "ebeam"));
    }
}
