use anyhow::{Result, bail};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Semantic type tag for a column, independent of any physical storage
/// representation. Closed set; columns without a mapping default to `Text`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SemanticType {
    Float,
    Text,
    Timestamp,
    Integer,
    Boolean,
}

/// Ordered mapping of column name to `SemanticType`.
///
/// Produced by an upstream inference step (or supplied as a JSON document)
/// and read-only to the rest of the pipeline. Insertion order is significant:
/// it feeds target-schema derivation downstream.
#[derive(Debug, Clone, Default)]
pub struct TypeMap {
    entries: Vec<(String, SemanticType)>,
}

impl TypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, SemanticType)>,
        S: Into<String>,
    {
        let mut map = Self::new();
        for (name, ty) in pairs {
            map.insert(name.into(), ty);
        }
        map
    }

    /// Insert or overwrite a column's type. Overwrites keep the original
    /// position so column order stays stable.
    pub fn insert(&mut self, name: String, ty: SemanticType) {
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = ty,
            None => self.entries.push((name, ty)),
        }
    }

    pub fn get(&self, name: &str) -> Option<SemanticType> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ty)| *ty)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SemanticType)> {
        self.entries.iter().map(|(n, ty)| (n.as_str(), *ty))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A single cell value, heterogeneous until cast.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit absent marker; both source nulls and failed coercions end up
    /// here so every downstream check treats them uniformly.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render the value as a string. Used by the Text cast, which must
    /// succeed for every input.
    pub fn render(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Timestamp(ts) => Some(ts.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
        }
    }
}

/// A named, ordered column of cell values.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Build a column from raw string cells; empty strings become `Null`.
    pub fn from_strings(name: impl Into<String>, raw: Vec<String>) -> Self {
        let values = raw
            .into_iter()
            .map(|s| {
                if s.trim().is_empty() {
                    Value::Null
                } else {
                    Value::Text(s)
                }
            })
            .collect();
        Self::new(name, values)
    }
}

/// An ordered tabular batch. Column order is significant; every column holds
/// the same number of rows.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    columns: Vec<Column>,
}

impl Batch {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(columns: Vec<Column>) -> Result<Self> {
        if let Some(first) = columns.first() {
            let expected = first.values.len();
            for col in &columns {
                if col.values.len() != expected {
                    bail!(
                        "column '{}' has {} rows, expected {}",
                        col.name,
                        col.values.len(),
                        expected
                    );
                }
            }
        }
        Ok(Self { columns })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows() == 0 || self.n_columns() == 0
    }

    /// One row as (column name, value) pairs in column order. Out-of-range
    /// cells surface as `Null` rather than panicking.
    pub fn row(&self, index: usize) -> Vec<(&str, &Value)> {
        self.columns
            .iter()
            .map(|c| (c.name.as_str(), c.values.get(index).unwrap_or(&Value::Null)))
            .collect()
    }
}
