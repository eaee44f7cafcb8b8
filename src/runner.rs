//! High-level pipeline API: cast, validate, load.
//!
//! This is the primary entry point for external users and for the CLI. Cast
//! and validation diagnostics accompany a successful load; only store
//! failures abort the call.

use anyhow::Result;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::cast::{CastError, cast_batch};
use crate::loader::{LoadOutcome, TableVersionLoader};
use crate::types::{Batch, TypeMap};
use crate::validate::{RowValidationError, RowValidator};

/// One load request: a raw batch plus its runtime type contract.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub base_table: String,
    pub batch: Batch,
    pub type_map: TypeMap,
}

/// Result of a completed pipeline run.
#[derive(Debug)]
pub struct LoadReport {
    pub job_id: String,
    pub outcome: LoadOutcome,
    pub rows_in_batch: usize,
    /// Column-level coercion diagnostics; the batch was still written.
    pub cast_errors: Vec<CastError>,
    /// Row-level validation diagnostics; flagged rows were still written.
    pub row_errors: Vec<RowValidationError>,
    pub duration: Duration,
}

/// Run the full pipeline for one batch: cast toward the type map, validate
/// every row, and materialize through the versioned-table loader.
///
/// Bad cells and bad rows never fail the call; they surface as diagnostics
/// on the report. An error return means the store write itself failed.
pub async fn run_load(loader: &TableVersionLoader, request: LoadRequest) -> Result<LoadReport> {
    let job_id = Uuid::new_v4().to_string();
    let start = Instant::now();

    tracing::info!(
        job_id,
        table = request.base_table,
        rows = request.batch.n_rows(),
        columns = request.batch.n_columns(),
        "starting load"
    );

    let (casted, cast_errors) = cast_batch(&request.batch, &request.type_map);
    for error in &cast_errors {
        tracing::warn!(job_id, column = error.column, "{}", error.message);
    }

    let validator = RowValidator::new(&request.type_map, &casted);
    let row_errors = validator.validate(&casted, &request.batch);
    if !row_errors.is_empty() {
        tracing::warn!(
            job_id,
            flagged_rows = row_errors.len(),
            "rows failed validation and will be written as-is"
        );
    }

    let outcome = loader
        .load(&casted, &request.type_map, &request.base_table)
        .await?;

    let report = LoadReport {
        job_id,
        outcome,
        rows_in_batch: casted.n_rows(),
        cast_errors,
        row_errors,
        duration: start.elapsed(),
    };

    tracing::info!(
        job_id = report.job_id,
        outcome = ?report.outcome,
        duration_ms = report.duration.as_millis() as u64,
        "load finished"
    );

    Ok(report)
}
