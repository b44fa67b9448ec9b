//! Record layouts inferred from the first recorded event of an extractor.

use std::fmt;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema, SchemaRef};

use crate::value::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Float64,
    Int64,
    UInt64,
    Boolean,
    Float64List(usize),
    Int64List(usize),
}

impl FieldType {
    pub fn data_type(&self) -> DataType {
        match self {
            FieldType::Float64 => DataType::Float64,
            FieldType::Int64 => DataType::Int64,
            FieldType::UInt64 => DataType::UInt64,
            FieldType::Boolean => DataType::Boolean,
            FieldType::Float64List(len) => {
                DataType::FixedSizeList(Arc::new(list_item(DataType::Float64)), *len as i32)
            }
            FieldType::Int64List(len) => {
                DataType::FixedSizeList(Arc::new(list_item(DataType::Int64)), *len as i32)
            }
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Float64 => write!(f, "f64"),
            FieldType::Int64 => write!(f, "i64"),
            FieldType::UInt64 => write!(f, "u64"),
            FieldType::Boolean => write!(f, "bool"),
            FieldType::Float64List(len) => write!(f, "[f64; {len}]"),
            FieldType::Int64List(len) => write!(f, "[i64; {len}]"),
        }
    }
}

// Matches the child field arrow's list builders produce by default.
pub(crate) fn list_item(data_type: DataType) -> Field {
    Field::new("item", data_type, true)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub ty: FieldType,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutMismatch {
    FieldCount { expected: usize, found: usize },
    FieldName { index: usize, expected: String, found: String },
    FieldType { field: String, expected: FieldType, found: FieldType },
}

impl fmt::Display for LayoutMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutMismatch::FieldCount { expected, found } => {
                write!(f, "expected {expected} fields, found {found}")
            }
            LayoutMismatch::FieldName {
                index,
                expected,
                found,
            } => write!(f, "field {index} is named '{found}', expected '{expected}'"),
            LayoutMismatch::FieldType {
                field,
                expected,
                found,
            } => write!(f, "field '{field}' has type {found}, expected {expected}"),
        }
    }
}

impl std::error::Error for LayoutMismatch {}

/// Ordered field layout of one extractor's rows, frozen once resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLayout {
    fields: Vec<FieldSpec>,
}

impl RecordLayout {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// Layout with every named field typed as a plain `f64`.
    pub fn float64(names: &[String]) -> Self {
        Self::new(
            names
                .iter()
                .map(|name| FieldSpec::new(name.clone(), FieldType::Float64))
                .collect(),
        )
    }

    pub fn infer(names: &[String], row: &Row) -> Result<Self, LayoutMismatch> {
        if names.len() != row.len() {
            return Err(LayoutMismatch::FieldCount {
                expected: names.len(),
                found: row.len(),
            });
        }
        let fields = names
            .iter()
            .zip(row)
            .map(|(name, value)| FieldSpec::new(name.clone(), value.field_type()))
            .collect();
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn check_row(&self, row: &Row) -> Result<(), LayoutMismatch> {
        if row.len() != self.fields.len() {
            return Err(LayoutMismatch::FieldCount {
                expected: self.fields.len(),
                found: row.len(),
            });
        }
        for (field, value) in self.fields.iter().zip(row) {
            let found = value.field_type();
            if found != field.ty {
                return Err(LayoutMismatch::FieldType {
                    field: field.name.clone(),
                    expected: field.ty,
                    found,
                });
            }
        }
        Ok(())
    }

    /// Structural comparison used when layouts from different workers meet.
    pub fn check_compatible(&self, other: &RecordLayout) -> Result<(), LayoutMismatch> {
        if self.fields.len() != other.fields.len() {
            return Err(LayoutMismatch::FieldCount {
                expected: self.fields.len(),
                found: other.fields.len(),
            });
        }
        for (index, (mine, theirs)) in self.fields.iter().zip(&other.fields).enumerate() {
            if mine.name != theirs.name {
                return Err(LayoutMismatch::FieldName {
                    index,
                    expected: mine.name.clone(),
                    found: theirs.name.clone(),
                });
            }
            if mine.ty != theirs.ty {
                return Err(LayoutMismatch::FieldType {
                    field: mine.name.clone(),
                    expected: mine.ty,
                    found: theirs.ty,
                });
            }
        }
        Ok(())
    }

    pub fn schema(&self) -> SchemaRef {
        let fields: Vec<Field> = self
            .fields
            .iter()
            .map(|spec| Field::new(&spec.name, spec.ty.data_type(), false))
            .collect();
        Arc::new(Schema::new(fields))
    }
}

/// Two-phase layout: unknown until the first successful record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LayoutState {
    #[default]
    Unresolved,
    Resolved(RecordLayout),
}

impl LayoutState {
    pub fn resolved(&self) -> Option<&RecordLayout> {
        match self {
            LayoutState::Unresolved => None,
            LayoutState::Resolved(layout) => Some(layout),
        }
    }

    /// Resolves on the first row, validates every later one.
    pub fn admit(&mut self, names: &[String], row: &Row) -> Result<(), LayoutMismatch> {
        match self {
            LayoutState::Unresolved => {
                *self = LayoutState::Resolved(RecordLayout::infer(names, row)?);
                Ok(())
            }
            LayoutState::Resolved(layout) => layout.check_row(row),
        }
    }
}
