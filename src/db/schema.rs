//! Physical schemas and the compatibility comparison that drives table
//! versioning.

use serde::{Deserialize, Serialize};

use crate::types::{Batch, SemanticType, TypeMap};

/// SQL data type as the store's catalog reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    DoublePrecision,
    Numeric,
    Text,
    Varchar,
    Char,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    /// Catalog type outside the classified set (UUID, BYTEA, JSON, ...).
    /// Never considered category-compatible with anything.
    Other,
}

/// Broad class a physical type belongs to. Two types in the same category
/// are interchangeable for append purposes even when the concrete
/// representation differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Textual,
    Numeric,
    Temporal,
    Boolean,
}

impl SqlType {
    /// Returns the SQL type name used in DDL.
    pub fn to_sql(&self) -> &'static str {
        match self {
            SqlType::Boolean => "BOOLEAN",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Real => "REAL",
            SqlType::DoublePrecision => "DOUBLE PRECISION",
            SqlType::Numeric => "NUMERIC",
            SqlType::Text => "TEXT",
            SqlType::Varchar => "VARCHAR",
            SqlType::Char => "CHAR",
            SqlType::Date => "DATE",
            SqlType::Time => "TIME",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::TimestampTz => "TIMESTAMP WITH TIME ZONE",
            SqlType::Other => "UNKNOWN",
        }
    }

    /// Parse a catalog type string. Length and precision modifiers such as
    /// `VARCHAR(50)` or `NUMERIC(10,2)` are stripped; types outside the
    /// classified set parse as `Other`.
    pub fn from_catalog(raw: &str) -> Self {
        let upper = raw.trim().to_uppercase();
        let base = upper.split('(').next().unwrap_or("").trim();

        match base {
            "BOOLEAN" | "BOOL" => SqlType::Boolean,
            "SMALLINT" | "INT2" => SqlType::SmallInt,
            "INTEGER" | "INT" | "INT4" => SqlType::Integer,
            "BIGINT" | "INT8" => SqlType::BigInt,
            "REAL" | "FLOAT4" => SqlType::Real,
            "DOUBLE PRECISION" | "FLOAT8" | "DOUBLE" | "FLOAT" => SqlType::DoublePrecision,
            "NUMERIC" | "DECIMAL" => SqlType::Numeric,
            "CHARACTER VARYING" | "VARCHAR" => SqlType::Varchar,
            "CHARACTER" | "CHAR" | "BPCHAR" => SqlType::Char,
            "TEXT" => SqlType::Text,
            "DATE" => SqlType::Date,
            "TIME" | "TIME WITHOUT TIME ZONE" => SqlType::Time,
            "TIMESTAMP" | "TIMESTAMP WITHOUT TIME ZONE" | "DATETIME" => SqlType::Timestamp,
            "TIMESTAMP WITH TIME ZONE" | "TIMESTAMPTZ" => SqlType::TimestampTz,
            _ => SqlType::Other,
        }
    }

    /// Broad class of this type, `None` for types outside the four classes.
    /// An unclassified type matches nothing but its exact self.
    pub fn category(&self) -> Option<TypeCategory> {
        match self {
            SqlType::Text | SqlType::Varchar | SqlType::Char => Some(TypeCategory::Textual),
            SqlType::SmallInt
            | SqlType::Integer
            | SqlType::BigInt
            | SqlType::Real
            | SqlType::DoublePrecision
            | SqlType::Numeric => Some(TypeCategory::Numeric),
            SqlType::Date | SqlType::Time | SqlType::Timestamp | SqlType::TimestampTz => {
                Some(TypeCategory::Temporal)
            }
            SqlType::Boolean => Some(TypeCategory::Boolean),
            SqlType::Other => None,
        }
    }

    /// Physical type a semantic tag materializes as.
    pub fn from_semantic(ty: SemanticType) -> Self {
        match ty {
            SemanticType::Float => SqlType::DoublePrecision,
            SemanticType::Text => SqlType::Text,
            SemanticType::Timestamp => SqlType::Timestamp,
            SemanticType::Integer => SqlType::BigInt,
            SemanticType::Boolean => SqlType::Boolean,
        }
    }
}

/// One column of a persisted or target schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub sql_type: SqlType,
}

/// Result of comparing a target schema against a persisted one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaMatch {
    Compatible,
    Incompatible {
        /// Column that failed the per-column check, when the failure is
        /// attributable to one.
        column: Option<String>,
        reason: String,
    },
}

impl SchemaMatch {
    pub fn is_compatible(&self) -> bool {
        matches!(self, SchemaMatch::Compatible)
    }
}

/// Derive the target schema from the type map in the batch's column order.
/// Columns the map does not cover default to nullable text.
pub fn target_schema(type_map: &TypeMap, batch: &Batch) -> Vec<ColumnSchema> {
    batch
        .columns()
        .iter()
        .map(|col| {
            let semantic = type_map.get(&col.name).unwrap_or(SemanticType::Text);
            ColumnSchema {
                name: col.name.clone(),
                sql_type: SqlType::from_semantic(semantic),
            }
        })
        .collect()
}

/// Decide whether `target` can be appended onto `persisted`.
///
/// Column name sequences must match element-for-element including order;
/// per column, types must be identical or fall in the same broad category.
/// The first failing column is reported for diagnostics.
pub fn compare_schemas(persisted: &[ColumnSchema], target: &[ColumnSchema]) -> SchemaMatch {
    let persisted_names: Vec<&str> = persisted.iter().map(|c| c.name.as_str()).collect();
    let target_names: Vec<&str> = target.iter().map(|c| c.name.as_str()).collect();

    if persisted_names != target_names {
        return SchemaMatch::Incompatible {
            column: None,
            reason: format!(
                "column names or order differ: persisted {persisted_names:?}, target {target_names:?}"
            ),
        };
    }

    for (p, t) in persisted.iter().zip(target) {
        if p.sql_type == t.sql_type {
            continue;
        }
        if let (Some(pc), Some(tc)) = (p.sql_type.category(), t.sql_type.category()) {
            if pc == tc {
                tracing::debug!(
                    column = %p.name,
                    persisted = p.sql_type.to_sql(),
                    target = t.sql_type.to_sql(),
                    "types differ but share a category, treating as compatible"
                );
                continue;
            }
        }
        return SchemaMatch::Incompatible {
            column: Some(p.name.clone()),
            reason: format!(
                "column '{}' is {} in the store but {} in the incoming batch",
                p.name,
                p.sql_type.to_sql(),
                t.sql_type.to_sql()
            ),
        };
    }

    SchemaMatch::Compatible
}

/// Generate the CREATE TABLE statement for a target schema. No IF NOT
/// EXISTS: creation must fail loudly if the table already exists.
pub fn generate_ddl(table_name: &str, schema: &[ColumnSchema]) -> String {
    let column_defs: Vec<String> = schema
        .iter()
        .map(|col| format!("  \"{}\" {}", col.name, col.sql_type.to_sql()))
        .collect();

    format!(
        "CREATE TABLE \"{}\" (\n{}\n)",
        table_name,
        column_defs.join(",\n")
    )
}
