//! Per-row validation against a runtime-built rule table.
//!
//! The record shape is not known until run time, so instead of a static
//! struct the validator assembles one rule closure per column from the type
//! map and applies the same table to every row. Rules see both the casted
//! cell and its source cell: a genuine source null is acceptable for every
//! declared type, while a null the caster produced from a non-null value is
//! a coercion failure and flags the row. Rows are never dropped here; the
//! caller decides what to do with flagged rows.

use serde::Serialize;

use crate::types::{Batch, SemanticType, TypeMap, Value};

/// One failed field check within a row.
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// All field failures for a single row, keyed by row index.
#[derive(Debug, Clone, Serialize)]
pub struct RowValidationError {
    pub row_index: usize,
    pub field_errors: Vec<FieldError>,
}

/// Rule over (casted cell, source cell).
type Rule = Box<dyn Fn(&Value, &Value) -> Result<(), String>>;

/// Validator holding one rule per batch column.
pub struct RowValidator {
    rules: Vec<(String, Rule)>,
}

impl RowValidator {
    /// Build the rule table for `batch`'s columns. Mapped columns get the
    /// rule for their semantic type; unmapped columns get a permissive
    /// text-or-null rule.
    pub fn new(type_map: &TypeMap, batch: &Batch) -> Self {
        let rules = batch
            .columns()
            .iter()
            .map(|col| {
                let ty = type_map.get(&col.name).unwrap_or(SemanticType::Text);
                (col.name.clone(), rule_for(ty))
            })
            .collect();
        Self { rules }
    }

    /// Check every row of `casted` independently against the rule table,
    /// consulting `source` to tell coerced nulls apart from source nulls.
    /// Collects one `RowValidationError` per row with at least one failing
    /// field. Nothing escapes as a panic or `Err`: a cell that cannot be
    /// addressed normalizes to the explicit absent value and checking
    /// continues.
    pub fn validate(&self, casted: &Batch, source: &Batch) -> Vec<RowValidationError> {
        let mut errors = Vec::new();

        for row_index in 0..casted.n_rows() {
            let mut field_errors = Vec::new();

            for (field, rule) in &self.rules {
                let cell = casted
                    .column(field)
                    .and_then(|c| c.values.get(row_index))
                    .unwrap_or(&Value::Null);
                let source_cell = source
                    .column(field)
                    .and_then(|c| c.values.get(row_index))
                    .unwrap_or(&Value::Null);

                if let Err(message) = rule(cell, source_cell) {
                    field_errors.push(FieldError {
                        field: field.clone(),
                        message,
                    });
                }
            }

            if !field_errors.is_empty() {
                errors.push(RowValidationError {
                    row_index,
                    field_errors,
                });
            }
        }

        errors
    }
}

/// Build the check for one semantic type. Typed rules accept the right
/// variant or a source null; a null that replaced a non-null source value is
/// reported as the coercion failure it is.
fn rule_for(ty: SemanticType) -> Rule {
    match ty {
        // Text accepts any value: stringification always succeeds.
        SemanticType::Text => Box::new(|_, _| Ok(())),
        SemanticType::Float => typed_rule("numeric", |v| {
            matches!(v, Value::Float(_) | Value::Int(_))
        }),
        SemanticType::Integer => typed_rule("integer", |v| matches!(v, Value::Int(_))),
        SemanticType::Boolean => typed_rule("boolean", |v| matches!(v, Value::Bool(_))),
        SemanticType::Timestamp => typed_rule("timestamp", |v| matches!(v, Value::Timestamp(_))),
    }
}

fn typed_rule(expected: &'static str, accepts: fn(&Value) -> bool) -> Rule {
    Box::new(move |cell, source_cell| match cell {
        v if accepts(v) => Ok(()),
        Value::Null if source_cell.is_null() => Ok(()),
        Value::Null => Err(format!(
            "value {:?} could not be coerced to {expected}",
            source_cell.render().unwrap_or_default()
        )),
        other => Err(format!("expected {expected} or null, got {other:?}")),
    })
}
