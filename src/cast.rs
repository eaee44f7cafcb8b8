//! Dynamic casting of raw batches toward a runtime-supplied type map.
//!
//! Individual cells that cannot be coerced become `Null`; they never abort the
//! cast and only surface later through row validation. A `CastError` is
//! emitted solely for structural problems, such as a mapped column that does
//! not exist in the batch at all.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::types::{Batch, Column, SemanticType, TypeMap, Value};

/// Column-level coercion failure. Per-cell failures are not errors.
#[derive(Debug, Clone, Serialize)]
pub struct CastError {
    pub column: String,
    pub message: String,
}

/// Timestamp formats accepted during coercion, widest-used first.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y", "%d/%m/%Y"];

/// Cast every mapped column of `batch` toward its declared semantic type.
///
/// Returns the casted batch plus a possibly empty list of column-level
/// errors. Columns absent from the type map pass through unchanged; mapped
/// columns absent from the batch produce a `CastError` and nothing else.
pub fn cast_batch(batch: &Batch, type_map: &TypeMap) -> (Batch, Vec<CastError>) {
    let mut errors = Vec::new();

    for (name, _) in type_map.iter() {
        if batch.column(name).is_none() {
            errors.push(CastError {
                column: name.to_string(),
                message: format!("column '{name}' not found in batch"),
            });
        }
    }

    let columns = batch
        .columns()
        .iter()
        .map(|col| match type_map.get(&col.name) {
            Some(ty) => Column::new(
                col.name.clone(),
                col.values.iter().map(|v| cast_value(v, ty)).collect(),
            ),
            None => col.clone(),
        })
        .collect();

    // Column lengths are unchanged by a per-cell map, so this cannot fail.
    let casted = Batch::new(columns).unwrap_or_else(|_| batch.clone());
    (casted, errors)
}

/// Coerce a single cell toward `ty`. Uncastable cells become `Null`.
pub fn cast_value(value: &Value, ty: SemanticType) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    match ty {
        SemanticType::Float => cast_float(value),
        SemanticType::Text => value.render().map(Value::Text).unwrap_or(Value::Null),
        SemanticType::Timestamp => cast_timestamp(value),
        SemanticType::Integer => cast_integer(value),
        SemanticType::Boolean => cast_boolean(value),
    }
}

fn cast_float(value: &Value) -> Value {
    match value {
        Value::Float(f) => Value::Float(*f),
        Value::Int(i) => Value::Float(*i as f64),
        Value::Bool(b) => Value::Float(if *b { 1.0 } else { 0.0 }),
        Value::Text(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn cast_integer(value: &Value) -> Value {
    match value {
        Value::Int(i) => Value::Int(*i),
        Value::Float(f) if f.fract() == 0.0 => Value::Int(*f as i64),
        Value::Bool(b) => Value::Int(i64::from(*b)),
        Value::Text(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn cast_boolean(value: &Value) -> Value {
    match value {
        Value::Bool(b) => Value::Bool(*b),
        Value::Int(0) => Value::Bool(false),
        Value::Int(1) => Value::Bool(true),
        Value::Text(s) => parse_bool(s.trim()).map(Value::Bool).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn cast_timestamp(value: &Value) -> Value {
    match value {
        Value::Timestamp(ts) => Value::Timestamp(*ts),
        Value::Text(s) => parse_timestamp(s.trim())
            .map(Value::Timestamp)
            .unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("t") || s == "1" {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") || s.eq_ignore_ascii_case("f") || s == "0" {
        Some(false)
    } else {
        None
    }
}

pub(crate) fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    for format in TIMESTAMP_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, format) {
            return Some(ts);
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}
