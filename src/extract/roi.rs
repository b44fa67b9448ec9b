use arrow::record_batch::RecordBatch;
use serde::Deserialize;

use super::{Extractor, ExtractorBuffer, ExtractorStats, IndexWindow, RowAccumulator};
use crate::error::{Error, Result};
use crate::layout::{FieldSpec, FieldType, RecordLayout};
use crate::source::{EventContext, ImageDims, ImageView};
use crate::value::{Row, Value};

pub const DEFAULT_NAME: &str = "Andor";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoiStat {
    Sum,
    #[default]
    Mean,
}

/// Rectangular region; 1-D images only use the column range.
#[derive(Debug, Clone, PartialEq)]
pub struct Roi {
    pub name: String,
    pub rows: IndexWindow,
    pub cols: IndexWindow,
    pub stat: RoiStat,
}

impl Roi {
    fn reduce(&self, image: &ImageView<'_>, dims: ImageDims) -> f64 {
        let mut sum = 0.0;
        let mut count = 0usize;
        match dims {
            ImageDims::Two { rows, cols } => {
                let col_range = self.cols.clamp(cols);
                for row in self.rows.clamp(rows) {
                    let line = &image.data[row * cols..(row + 1) * cols];
                    sum += line[col_range.clone()].iter().sum::<f64>();
                    count += col_range.len();
                }
            }
            ImageDims::One(len) => {
                let range = self.cols.clamp(len);
                count = range.len();
                sum = image.data[range].iter().sum();
            }
        }
        match self.stat {
            RoiStat::Sum => sum,
            RoiStat::Mean if count == 0 => f64::NAN,
            RoiStat::Mean => sum / count as f64,
        }
    }
}

/// Reduces each configured region of a camera image to one number.
#[derive(Debug)]
pub struct ImageRoiExtractor {
    alias: String,
    rois: Vec<Roi>,
    acc: RowAccumulator,
}

impl ImageRoiExtractor {
    pub fn new(name: impl Into<String>, alias: impl Into<String>, rois: Vec<Roi>) -> Result<Self> {
        let name = name.into();
        if rois.is_empty() {
            return Err(Error::Config(format!(
                "image extractor '{name}' has no regions of interest"
            )));
        }
        let layout = RecordLayout::new(
            rois.iter()
                .map(|roi| FieldSpec::new(roi.name.clone(), FieldType::Float64))
                .collect(),
        );
        let acc = RowAccumulator::fixed(name, layout)?;
        Ok(Self {
            alias: alias.into(),
            rois,
            acc,
        })
    }

    fn capture(&self, ctx: &EventContext<'_>) -> Option<Row> {
        let image = ctx.event.image(&self.alias)?;
        let dims = image.dims()?;
        // A single pixel is what the camera publishes when it has no frame.
        if image.data.len() <= 1 {
            return None;
        }
        Some(
            self.rois
                .iter()
                .map(|roi| Value::F64(roi.reduce(&image, dims)))
                .collect(),
        )
    }
}

impl Extractor for ImageRoiExtractor {
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
