//! Destination writes: one batch, one parameterized insert.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error};

use crate::core::{Batch, InsertStatement, RowOutcome, TargetWriter, WriteSession};
use crate::error::{MigrateError, Result};

/// Writes batches to the destination table.
///
/// Each call binds every row of the batch to the same INSERT and executes
/// them as one pipelined unit. Any rejected row fails the whole batch.
#[derive(Clone)]
pub struct BatchWriter {
    target: Arc<dyn TargetWriter>,
    stmt: Arc<InsertStatement>,
}

impl BatchWriter {
    pub fn new(target: Arc<dyn TargetWriter>, stmt: Arc<InsertStatement>) -> Self {
        Self { target, stmt }
    }

    /// Insert a batch in a transaction of its own.
    ///
    /// Returns the number of rows in the batch once it has been committed.
    pub async fn insert(&self, batch: &Batch) -> Result<u64> {
        let start = Instant::now();
        let outcomes = self
            .target
            .insert_rows(&self.stmt, &batch.rows)
            .await
            .map_err(|e| into_insert_failed(batch.sequence_id, e))?;
        let rows = check_outcomes(batch, &outcomes)?;

        debug!(
            "Batch {}: inserted {} rows in {:?}",
            batch.sequence_id,
            rows,
            start.elapsed()
        );
        Ok(rows)
    }

    /// Insert a batch inside a transaction owned by the caller.
    ///
    /// Nothing is committed here; on failure the caller is expected to roll
    /// the session back.
    pub async fn insert_in(&self, session: &mut dyn WriteSession, batch: &Batch) -> Result<u64> {
        let start = Instant::now();
        let outcomes = session
            .insert_rows(&self.stmt, &batch.rows)
            .await
            .map_err(|e| into_insert_failed(batch.sequence_id, e))?;
        let rows = check_outcomes(batch, &outcomes)?;

        debug!(
            "Batch {}: wrote {} rows (uncommitted) in {:?}",
            batch.sequence_id,
            rows,
            start.elapsed()
        );
        Ok(rows)
    }
}

/// Inspect the per-row outcome array.
fn check_outcomes(batch: &Batch, outcomes: &[RowOutcome]) -> Result<u64> {
    if outcomes.len() != batch.len() {
        return Err(MigrateError::insert_failed(
            batch.sequence_id,
            format!(
                "driver reported {} outcomes for {} rows",
                outcomes.len(),
                batch.len()
            ),
        ));
    }

    let mut failed = outcomes.iter().enumerate().filter_map(|(i, o)| match o {
        RowOutcome::Failed(msg) => Some((i, msg)),
        RowOutcome::Inserted(_) => None,
    });

    if let Some((index, msg)) = failed.next() {
        let more = failed.count();
        error!(
            "Batch {}: row {} failed ({} more rows failed): {}",
            batch.sequence_id, index, more, msg
        );
        return Err(MigrateError::insert_failed(
            batch.sequence_id,
            format!("row {index} failed: {msg}"),
        ));
    }

    Ok(batch.len() as u64)
}

/// Thrown driver errors discard the batch as `InsertFailed`.
/// Connection acquisition failures keep their own kind.
fn into_insert_failed(batch: u64, err: MigrateError) -> MigrateError {
    match err {
        MigrateError::InsertFailed { .. } | MigrateError::Connection { .. } => err,
        other => {
            error!("Batch {} failed: {}", batch, other);
            MigrateError::insert_failed(batch, other.to_string())
        }
    }
}
