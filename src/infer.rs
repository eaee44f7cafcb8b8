//! Deterministic semantic type inference from sample data.
//!
//! Guesses a tag per value, then settles each column by promotion across the
//! sampled rows: numeric widths widen, anything mixed with text becomes text.
//! The result is an ordinary `TypeMap`; callers remain free to supply their
//! own map instead.

use crate::cast::parse_timestamp;
use crate::config::SAMPLE_ROWS;
use crate::types::{Batch, SemanticType, TypeMap, Value};

/// Infer a type map for every column of `batch`, looking at up to
/// `SAMPLE_ROWS` values per column. Columns with no non-null samples default
/// to `Text`.
pub fn infer_type_map(batch: &Batch) -> TypeMap {
    let mut map = TypeMap::new();

    for col in batch.columns() {
        let mut verdict: Option<SemanticType> = None;

        for value in col.values.iter().take(SAMPLE_ROWS) {
            let Some(guess) = guess_value_type(value) else {
                continue; // nulls carry no type evidence
            };
            verdict = Some(match verdict {
                None => guess,
                Some(current) => promote(current, guess),
            });
        }

        map.insert(col.name.clone(), verdict.unwrap_or(SemanticType::Text));
    }

    map
}

/// Guess the semantic type of one raw value; `None` for nulls.
fn guess_value_type(value: &Value) -> Option<SemanticType> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some(SemanticType::Boolean),
        Value::Int(_) => Some(SemanticType::Integer),
        Value::Float(_) => Some(SemanticType::Float),
        Value::Timestamp(_) => Some(SemanticType::Timestamp),
        Value::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
                return Some(SemanticType::Boolean);
            }
            if trimmed.parse::<i64>().is_ok() {
                return Some(SemanticType::Integer);
            }
            if trimmed.parse::<f64>().is_ok() {
                return Some(SemanticType::Float);
            }
            if parse_timestamp(trimmed).is_some() {
                return Some(SemanticType::Timestamp);
            }
            Some(SemanticType::Text)
        }
    }
}

/// Most specific common type accommodating both guesses.
fn promote(a: SemanticType, b: SemanticType) -> SemanticType {
    use SemanticType::*;
    match (a, b) {
        _ if a == b => a,
        (Integer, Float) | (Float, Integer) => Float,
        (Boolean, Integer) | (Integer, Boolean) => Integer,
        (Boolean, Float) | (Float, Boolean) => Float,
        _ => Text,
    }
}
