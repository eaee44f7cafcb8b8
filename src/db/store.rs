//! Store access: catalog introspection, DDL, and appends over sqlx.
//!
//! Production runs against Postgres; tests swap in an in-memory SQLite pool
//! behind the same enum so the loader state machine is exercised end to end.
//! Connections are pooled and scoped per operation: acquired from the pool
//! for the duration of a statement and released on every exit path.

use anyhow::{Context, Result};
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::Query;

use crate::config::{CONNECT_TIMEOUT, DbConfig, INSERT_CHUNK_ROWS};
use crate::db::schema::{ColumnSchema, SqlType, TypeCategory, generate_ddl};
use crate::types::{Batch, Value};

#[derive(Debug, Clone)]
enum StoreInner {
    Postgres(sqlx::PgPool),
    #[cfg(test)]
    Sqlite(sqlx::SqlitePool),
}

/// Forced failure mode for schema fetches. Lets tests drive the loader's
/// degrade paths, which a healthy embedded store cannot produce.
#[cfg(test)]
#[derive(Debug, Clone, Copy)]
pub enum SchemaFetchFault {
    Failure,
    EmptyListing,
}

/// Handle to the relational store.
#[derive(Debug, Clone)]
pub struct Store {
    inner: StoreInner,
    #[cfg(test)]
    schema_fault: std::sync::Arc<std::sync::Mutex<Option<SchemaFetchFault>>>,
}

const PG_TABLE_EXISTS_SQL: &str = r#"
    SELECT EXISTS (
        SELECT 1 FROM information_schema.tables
        WHERE table_schema = 'public' AND table_name = $1
    )
"#;

// Scoped to the same schema as the existence probe: a same-named table in
// another schema must not leak its columns into the layout.
const PG_TABLE_SCHEMA_SQL: &str = r#"
    SELECT column_name, data_type
    FROM information_schema.columns
    WHERE table_schema = 'public' AND table_name = $1
    ORDER BY ordinal_position
"#;

/// Connect to Postgres using an explicit configuration value.
pub async fn connect(config: &DbConfig) -> Result<Store> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(CONNECT_TIMEOUT)
        .connect(&config.url)
        .await
        .context("Failed to connect to the store")?;

    Ok(Store::from_inner(StoreInner::Postgres(pool)))
}

impl Store {
    fn from_inner(inner: StoreInner) -> Self {
        Store {
            inner,
            #[cfg(test)]
            schema_fault: Default::default(),
        }
    }

    /// Create an in-memory SQLite store for testing. A single pooled
    /// connection keeps every statement on the same in-memory database.
    #[cfg(test)]
    pub async fn sqlite_in_memory() -> Result<Self> {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to create in-memory SQLite pool")?;

        Ok(Store::from_inner(StoreInner::Sqlite(pool)))
    }

    /// Arm or clear a schema-fetch fault. Shared across clones of this
    /// store, so the loader under test sees it too.
    #[cfg(test)]
    pub fn set_schema_fetch_fault(&self, fault: Option<SchemaFetchFault>) {
        *self.schema_fault.lock().unwrap() = fault;
    }

    /// Probe the catalog for a table. Always a fresh lookup; the store may
    /// change between pipeline runs.
    pub async fn table_exists(&self, table_name: &str) -> Result<bool> {
        match &self.inner {
            StoreInner::Postgres(pool) => {
                let exists: bool = sqlx::query_scalar(PG_TABLE_EXISTS_SQL)
                    .bind(table_name)
                    .fetch_one(pool)
                    .await
                    .context("Failed to check table existence")?;
                Ok(exists)
            }
            #[cfg(test)]
            StoreInner::Sqlite(pool) => {
                let count: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                )
                .bind(table_name)
                .fetch_one(pool)
                .await
                .context("Failed to check table existence")?;
                Ok(count > 0)
            }
        }
    }

    /// Fetch the ordered column layout of an existing table from the
    /// store's catalog.
    pub async fn table_schema(&self, table_name: &str) -> Result<Vec<ColumnSchema>> {
        #[cfg(test)]
        match *self.schema_fault.lock().unwrap() {
            Some(SchemaFetchFault::Failure) => anyhow::bail!("catalog lookup refused"),
            Some(SchemaFetchFault::EmptyListing) => return Ok(Vec::new()),
            None => {}
        }

        match &self.inner {
            StoreInner::Postgres(pool) => {
                let rows: Vec<(String, String)> = sqlx::query_as(PG_TABLE_SCHEMA_SQL)
                    .bind(table_name)
                    .fetch_all(pool)
                    .await
                    .context("Failed to query table schema")?;

                Ok(rows
                    .into_iter()
                    .map(|(name, data_type)| ColumnSchema {
                        name,
                        sql_type: SqlType::from_catalog(&data_type),
                    })
                    .collect())
            }
            #[cfg(test)]
            StoreInner::Sqlite(pool) => {
                // PRAGMA does not take bind parameters.
                let pragma = format!("PRAGMA table_info(\"{}\")", table_name);
                let rows: Vec<(i64, String, String, i64, Option<String>, i64)> =
                    sqlx::query_as(&pragma)
                        .fetch_all(pool)
                        .await
                        .context("Failed to query table schema")?;

                Ok(rows
                    .into_iter()
                    .map(|(_, name, declared_type, _, _, _)| ColumnSchema {
                        name,
                        sql_type: SqlType::from_catalog(&declared_type),
                    })
                    .collect())
            }
        }
    }

    /// Create a table with the given schema. Fails if the table already
    /// exists; silent creation over an existing table is never acceptable.
    pub async fn create_table(&self, table_name: &str, schema: &[ColumnSchema]) -> Result<()> {
        let ddl = generate_ddl(table_name, schema);
        tracing::debug!(table = table_name, "creating table");

        match &self.inner {
            StoreInner::Postgres(pool) => {
                sqlx::query(&ddl)
                    .execute(pool)
                    .await
                    .with_context(|| format!("Failed to create table '{}'", table_name))?;
            }
            #[cfg(test)]
            StoreInner::Sqlite(pool) => {
                sqlx::query(&ddl)
                    .execute(pool)
                    .await
                    .with_context(|| format!("Failed to create table '{}'", table_name))?;
            }
        }
        Ok(())
    }

    /// Append every row of `batch` to `table_name`, binding values typed per
    /// the target schema. Statements are chunked below the store's bind
    /// parameter ceiling, but every chunk of one call runs inside a single
    /// transaction: either all rows land or none do.
    pub async fn append_rows(
        &self,
        table_name: &str,
        schema: &[ColumnSchema],
        batch: &Batch,
    ) -> Result<u64> {
        let n_rows = batch.n_rows();

        match &self.inner {
            StoreInner::Postgres(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .context("Failed to open append transaction")?;
                let mut offset = 0;
                while offset < n_rows {
                    let rows = (n_rows - offset).min(INSERT_CHUNK_ROWS);
                    let sql = insert_sql(table_name, schema, rows, true);
                    let mut query = sqlx::query(&sql);
                    for row in offset..offset + rows {
                        for (col, layout) in batch.columns().iter().zip(schema) {
                            let value = col.values.get(row).unwrap_or(&Value::Null);
                            query = bind_pg(query, value, layout);
                        }
                    }
                    query
                        .execute(&mut *tx)
                        .await
                        .with_context(|| format!("Failed to append rows to '{}'", table_name))?;
                    offset += rows;
                }
                tx.commit()
                    .await
                    .context("Failed to commit append transaction")?;
            }
            #[cfg(test)]
            StoreInner::Sqlite(pool) => {
                let mut tx = pool
                    .begin()
                    .await
                    .context("Failed to open append transaction")?;
                let mut offset = 0;
                while offset < n_rows {
                    let rows = (n_rows - offset).min(INSERT_CHUNK_ROWS);
                    let sql = insert_sql(table_name, schema, rows, false);
                    let mut query = sqlx::query(&sql);
                    for row in offset..offset + rows {
                        for (col, layout) in batch.columns().iter().zip(schema) {
                            let value = col.values.get(row).unwrap_or(&Value::Null);
                            query = bind_sqlite(query, value, layout);
                        }
                    }
                    query
                        .execute(&mut *tx)
                        .await
                        .with_context(|| format!("Failed to append rows to '{}'", table_name))?;
                    offset += rows;
                }
                tx.commit()
                    .await
                    .context("Failed to commit append transaction")?;
            }
        }

        Ok(n_rows as u64)
    }

    /// Row count helper for integration tests.
    #[cfg(test)]
    pub async fn count_rows(&self, table_name: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM \"{}\"", table_name);
        match &self.inner {
            StoreInner::Postgres(pool) => Ok(sqlx::query_scalar(&sql).fetch_one(pool).await?),
            StoreInner::Sqlite(pool) => Ok(sqlx::query_scalar(&sql).fetch_one(pool).await?),
        }
    }

    /// Raw statement helper for test fixtures.
    #[cfg(test)]
    pub async fn execute_raw(&self, sql: &str) -> Result<()> {
        match &self.inner {
            StoreInner::Postgres(pool) => {
                sqlx::query(sql).execute(pool).await?;
            }
            StoreInner::Sqlite(pool) => {
                sqlx::query(sql).execute(pool).await?;
            }
        }
        Ok(())
    }
}

/// Build a multi-row INSERT statement with `$n` (Postgres) or `?` (SQLite)
/// placeholders.
fn insert_sql(table_name: &str, schema: &[ColumnSchema], rows: usize, numbered: bool) -> String {
    let column_list: Vec<String> = schema.iter().map(|c| format!("\"{}\"", c.name)).collect();

    let mut value_groups = Vec::with_capacity(rows);
    let mut param_idx = 1;
    for _ in 0..rows {
        let placeholders: Vec<String> = (0..schema.len())
            .map(|_| {
                let p = if numbered {
                    format!("${}", param_idx)
                } else {
                    "?".to_string()
                };
                param_idx += 1;
                p
            })
            .collect();
        value_groups.push(format!("({})", placeholders.join(", ")));
    }

    format!(
        "INSERT INTO \"{}\" ({}) VALUES {}",
        table_name,
        column_list.join(", "),
        value_groups.join(", ")
    )
}

/// Bind one value for Postgres. Nulls are bound typed per the column's
/// physical category so the extended protocol can resolve the parameter.
fn bind_pg<'q>(
    query: Query<'q, sqlx::Postgres, PgArguments>,
    value: &Value,
    col: &ColumnSchema,
) -> Query<'q, sqlx::Postgres, PgArguments> {
    match value {
        Value::Null => match col.sql_type.category() {
            Some(TypeCategory::Boolean) => query.bind(None::<bool>),
            Some(TypeCategory::Numeric) => query.bind(None::<f64>),
            Some(TypeCategory::Temporal) => query.bind(None::<chrono::NaiveDateTime>),
            Some(TypeCategory::Textual) | None => query.bind(None::<String>),
        },
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        Value::Timestamp(ts) => query.bind(*ts),
    }
}

#[cfg(test)]
fn bind_sqlite<'q>(
    query: Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    value: &Value,
    col: &ColumnSchema,
) -> Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    match value {
        Value::Null => match col.sql_type.category() {
            Some(TypeCategory::Boolean) => query.bind(None::<bool>),
            Some(TypeCategory::Numeric) => query.bind(None::<f64>),
            Some(TypeCategory::Temporal) => query.bind(None::<chrono::NaiveDateTime>),
            Some(TypeCategory::Textual) | None => query.bind(None::<String>),
        },
        Value::Bool(b) => query.bind(*b),
        Value::Int(i) => query.bind(*i),
        Value::Float(f) => query.bind(*f),
        Value::Text(s) => query.bind(s.clone()),
        Value::Timestamp(ts) => query.bind(*ts),
    }
}
