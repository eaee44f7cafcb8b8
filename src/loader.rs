//! Versioned-table materialization.
//!
//! One load call decides, without human intervention, whether a batch can
//! join the existing table of its base name or must be isolated into a new
//! timestamp-suffixed generation, and performs the write. The catalog is
//! probed fresh on every call; nothing is cached between calls because the
//! store is externally mutable between pipeline runs.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Mutex;

use crate::db::Store;
use crate::db::schema::{SchemaMatch, compare_schemas, target_schema};
use crate::types::{Batch, TypeMap};

/// Outcome of a single load call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Empty batch; no catalog or write operation occurred.
    NoOp,
    /// A table with this name was created and populated.
    Created(String),
    /// Rows were appended to this existing table.
    Appended(String),
}

/// Monotonic source for versioned-table suffixes.
///
/// Successive calls within one process never yield the same suffix even when
/// the wall clock ties at microsecond resolution; ties are bumped by one
/// microsecond. Cross-process collisions remain uncoordinated.
#[derive(Debug, Default)]
pub struct VersionClock {
    last_micros: Mutex<i64>,
}

impl VersionClock {
    /// Next suffix: UTC instant rendered as a fixed-width decimal string
    /// with second and microsecond precision.
    pub fn next_suffix(&self) -> String {
        let mut last = self.last_micros.lock().unwrap_or_else(|e| e.into_inner());
        let mut now = Utc::now().timestamp_micros();
        if now <= *last {
            now = *last + 1;
        }
        *last = now;

        DateTime::<Utc>::from_timestamp_micros(now)
            .unwrap_or_default()
            .format("%Y%m%d%H%M%S%6f")
            .to_string()
    }
}

/// Loader orchestrating catalog lookup, schema comparison, and the write.
pub struct TableVersionLoader {
    store: Store,
    clock: VersionClock,
}

impl TableVersionLoader {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            clock: VersionClock::default(),
        }
    }

    /// Load one batch against `base_table`, performing exactly one write
    /// (create-and-populate or append). Store failures are fatal for the
    /// call and propagate to the caller; they are never retried here.
    pub async fn load(
        &self,
        batch: &Batch,
        type_map: &TypeMap,
        base_table: &str,
    ) -> Result<LoadOutcome> {
        if batch.is_empty() {
            tracing::info!(
                table = base_table,
                "batch has no rows or no columns, skipping load"
            );
            return Ok(LoadOutcome::NoOp);
        }

        let target = target_schema(type_map, batch);

        let exists = self
            .store
            .table_exists(base_table)
            .await
            .context("Failed to probe catalog for target table")?;

        if !exists {
            tracing::info!(table = base_table, "table does not exist, creating it");
            self.create_and_populate(base_table, &target, batch).await?;
            return Ok(LoadOutcome::Created(base_table.to_string()));
        }

        // The table exists; verify its layout before appending into it.
        let persisted = match self.store.table_schema(base_table).await {
            Ok(schema) if !schema.is_empty() => schema,
            Ok(_) => {
                // Fail-safe: never append into a schema that could not be
                // verified. An empty catalog listing for an existing table
                // usually means a permissions or connectivity problem.
                tracing::warn!(
                    table = base_table,
                    "existing table reported no columns, isolating batch in a versioned table"
                );
                return self.create_versioned(base_table, &target, batch).await;
            }
            Err(error) => {
                tracing::warn!(
                    table = base_table,
                    error = %error,
                    "schema fetch failed, isolating batch in a versioned table"
                );
                return self.create_versioned(base_table, &target, batch).await;
            }
        };

        match compare_schemas(&persisted, &target) {
            SchemaMatch::Compatible => {
                tracing::info!(table = base_table, "schemas match, appending");
                let written = self
                    .store
                    .append_rows(base_table, &target, batch)
                    .await
                    .context("Failed to append batch")?;
                tracing::info!(table = base_table, rows = written, "append complete");
                Ok(LoadOutcome::Appended(base_table.to_string()))
            }
            SchemaMatch::Incompatible { column, reason } => {
                tracing::info!(
                    table = base_table,
                    column = column.as_deref().unwrap_or(""),
                    reason,
                    "schemas incompatible, creating a versioned table"
                );
                self.create_versioned(base_table, &target, batch).await
            }
        }
    }

    async fn create_versioned(
        &self,
        base_table: &str,
        target: &[crate::db::schema::ColumnSchema],
        batch: &Batch,
    ) -> Result<LoadOutcome> {
        let versioned = format!("{}_{}", base_table, self.clock.next_suffix());
        self.create_and_populate(&versioned, target, batch).await?;
        Ok(LoadOutcome::Created(versioned))
    }

    async fn create_and_populate(
        &self,
        table: &str,
        target: &[crate::db::schema::ColumnSchema],
        batch: &Batch,
    ) -> Result<()> {
        self.store
            .create_table(table, target)
            .await
            .context("Failed to create target table")?;
        let written = self
            .store
            .append_rows(table, target, batch)
            .await
            .context("Failed to populate new table")?;
        tracing::info!(table, rows = written, "table created and populated");
        Ok(())
    }
}
