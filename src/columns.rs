//! Typed column building from accumulated rows.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanBuilder, FixedSizeListBuilder, Float64Builder, Int64Builder, UInt64Builder,
};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};

use crate::error::{Error, Result};
use crate::layout::{FieldType, RecordLayout};
use crate::value::{Row, Value};

/// Converts rows into one record batch following `layout`.
///
/// Rows are expected to have been admitted against the same layout; a cell
/// that does not fit its column is reported as a layout error for `name`.
pub fn materialize(name: &str, layout: &RecordLayout, rows: &[Row]) -> Result<RecordBatch> {
    let mut builders: Vec<ColumnBuilder> = layout
        .fields()
        .iter()
        .map(|field| ColumnBuilder::new(field.ty, rows.len()))
        .collect();

    for row in rows {
        layout.check_row(row).map_err(|mismatch| Error::Layout {
            extractor: name.to_string(),
            mismatch,
        })?;
        for (builder, value) in builders.iter_mut().zip(row) {
            builder.append(value);
        }
    }

    let arrays: Vec<ArrayRef> = builders.iter_mut().map(|b| b.finish()).collect();
    let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
    Ok(RecordBatch::try_new_with_options(layout.schema(), arrays, &options)?)
}

/// Boolean membership columns, one per name, all sharing `rows` rows.
pub fn boolean_columns(
    names: &[String],
    rows: usize,
    mut member: impl FnMut(usize, usize) -> bool,
) -> Result<RecordBatch> {
    let layout = RecordLayout::new(
        names
            .iter()
            .map(|name| crate::layout::FieldSpec::new(name.clone(), FieldType::Boolean))
            .collect(),
    );
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(names.len());
    for col in 0..names.len() {
        let mut builder = BooleanBuilder::with_capacity(rows);
        for row in 0..rows {
            builder.append_value(member(row, col));
        }
        arrays.push(Arc::new(builder.finish()));
    }
    let options = RecordBatchOptions::new().with_row_count(Some(rows));
    Ok(RecordBatch::try_new_with_options(layout.schema(), arrays, &options)?)
}

enum ColumnBuilder {
    F64(Float64Builder),
    I64(Int64Builder),
    U64(UInt64Builder),
    Bool(BooleanBuilder),
    F64List(FixedSizeListBuilder<Float64Builder>),
    I64List(FixedSizeListBuilder<Int64Builder>),
}

impl ColumnBuilder {
    fn new(ty: FieldType, capacity: usize) -> Self {
        match ty {
            FieldType::Float64 => Self::F64(Float64Builder::with_capacity(capacity)),
            FieldType::Int64 => Self::I64(Int64Builder::with_capacity(capacity)),
            FieldType::UInt64 => Self::U64(UInt64Builder::with_capacity(capacity)),
            FieldType::Boolean => Self::Bool(BooleanBuilder::with_capacity(capacity)),
            FieldType::Float64List(len) => Self::F64List(FixedSizeListBuilder::with_capacity(
                Float64Builder::with_capacity(capacity * len),
                len as i32,
                capacity,
            )),
            FieldType::Int64List(len) => Self::I64List(FixedSizeListBuilder::with_capacity(
                Int64Builder::with_capacity(capacity * len),
                len as i32,
                capacity,
            )),
        }
    }

    // Callers check the row against the layout first, so a mismatch here is a bug.
    fn append(&mut self, value: &Value) {
        match (self, value) {
            (ColumnBuilder::F64(builder), Value::F64(v)) => builder.append_value(*v),
            (ColumnBuilder::I64(builder), Value::I64(v)) => builder.append_value(*v),
            (ColumnBuilder::U64(builder), Value::U64(v)) => builder.append_value(*v),
            (ColumnBuilder::Bool(builder), Value::Bool(v)) => builder.append_value(*v),
            (ColumnBuilder::F64List(builder), Value::F64Array(values)) => {
                builder.values().append_slice(values);
                builder.append(true);
            }
            (ColumnBuilder::I64List(builder), Value::I64Array(values)) => {
                builder.values().append_slice(values);
                builder.append(true);
            }
            (_, other) => panic!("column builder received unchecked value {other:?}"),
        }
    }

    fn finish(&mut self) -> ArrayRef {
        match self {
            ColumnBuilder::F64(builder) => Arc::new(builder.finish()),
            ColumnBuilder::I64(builder) => Arc::new(builder.finish()),
            ColumnBuilder::U64(builder) => Arc::new(builder.finish()),
            ColumnBuilder::Bool(builder) => Arc::new(builder.finish()),
            ColumnBuilder::F64List(builder) => Arc::new(builder.finish()),
            ColumnBuilder::I64List(builder) => Arc::new(builder.finish()),
        }
    }
}
