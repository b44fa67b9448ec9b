//! Cell values pulled out of events.

use serde::{Deserialize, Serialize};

use crate::layout::FieldType;

/// One cell of a recorded row.
///
/// Variant order matters for untagged deserialization: integers are tried
/// before floats so `3` stays an `I64` while `3.5` becomes an `F64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    I64Array(Vec<i64>),
    F64Array(Vec<f64>),
}

pub type Row = Vec<Value>;

impl Value {
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Bool(_) => FieldType::Boolean,
            Value::I64(_) => FieldType::Int64,
            Value::U64(_) => FieldType::UInt64,
            Value::F64(_) => FieldType::Float64,
            Value::I64Array(values) => FieldType::Int64List(values.len()),
            Value::F64Array(values) => FieldType::Float64List(values.len()),
        }
    }

    /// Numeric view used by reductions; arrays and booleans have none.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::I64(v) => Some(*v as f64),
            Value::U64(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::F64(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::I64(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::U64(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Vec<f64>> for Value {
    fn from(value: Vec<f64>) -> Self {
        Value::F64Array(value)
    }
}

impl From<Vec<i64>> for Value {
    fn from(value: Vec<i64>) -> Self {
        Value::I64Array(value)
    }
}
