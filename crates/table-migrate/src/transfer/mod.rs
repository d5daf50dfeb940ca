//! Concurrent batch writes bounded by the destination pool.
//!
//! Every flushed batch becomes one tokio task. Tasks queue on a semaphore
//! sized to the destination pool, so at most that many inserts run at once
//! and the extraction loop never waits on an individual write. Completion
//! order is unspecified.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::Batch;
use crate::error::{MigrateError, Result};
use crate::target::BatchWriter;

/// How long to wait for outstanding writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainPolicy {
    /// Length of one wait window; a warning is logged each time one elapses.
    pub window: Duration,

    /// Windows to wait before cancelling outstanding writes.
    /// `None` waits until every write finishes or the run is cancelled.
    pub patience: Option<u32>,
}

impl Default for DrainPolicy {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            patience: None,
        }
    }
}

/// Outcome of a drain.
#[derive(Debug, Default)]
pub struct WriteReport {
    /// Rows committed by successful batches.
    pub rows: u64,

    /// Batches committed.
    pub batches: u64,

    /// Failed batches, ordered by sequence id.
    pub failures: Vec<(u64, MigrateError)>,

    /// Set when outstanding writes were aborted.
    pub interrupted: Option<MigrateError>,
}

impl WriteReport {
    /// Committed row count, or the error that fails the run: the
    /// interruption if there was one, else the lowest-numbered failed batch.
    pub fn into_result(mut self) -> Result<u64> {
        if let Some(e) = self.interrupted {
            return Err(e);
        }
        if self.failures.is_empty() {
            return Ok(self.rows);
        }
        let (_, first) = self.failures.remove(0);
        Err(first)
    }
}

/// Bounded pool of batch writers.
pub struct WritePool {
    writer: BatchWriter,
    semaphore: Arc<Semaphore>,
    handles: Vec<(u64, JoinHandle<Result<u64>>)>,
}

impl WritePool {
    /// Create a pool running at most `workers` inserts at a time.
    pub fn new(writer: BatchWriter, workers: usize) -> Self {
        Self {
            writer,
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
            handles: Vec::new(),
        }
    }

    /// Number of batches submitted so far.
    pub fn submitted(&self) -> usize {
        self.handles.len()
    }

    /// Queue a batch for writing and return its sequence id.
    ///
    /// Never waits: the task acquires its permit once it is scheduled.
    pub fn submit(&mut self, batch: Batch) -> u64 {
        let sequence_id = batch.sequence_id;
        let rows = batch.len();
        let semaphore = self.semaphore.clone();
        let writer = self.writer.clone();

        let handle = tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .map_err(|e| MigrateError::MigrationFailed(format!("write pool closed: {e}")))?;
            writer.insert(&batch).await
        });

        debug!("Batch {}: submitted ({} rows)", sequence_id, rows);
        self.handles.push((sequence_id, handle));
        sequence_id
    }

    /// Stop accepting batches and wait for every outstanding write.
    ///
    /// Waits in windows of `policy.window`, warning after each. Outstanding
    /// writes are aborted only when `cancel` fires or the patience limit is
    /// reached, both of which set `interrupted`. Otherwise every task's
    /// outcome is collected. Batches that already committed are never
    /// rolled back, so the committed row count is logged whenever the
    /// report is not a success.
    pub async fn drain(self, policy: DrainPolicy, cancel: &CancellationToken) -> WriteReport {
        let total = self.handles.len();
        let mut pending: VecDeque<_> = self.handles.into();
        let mut report = WriteReport::default();
        let mut windows = 0u32;
        let mut deadline = Instant::now() + policy.window;

        info!("Draining {} batch writes", total);

        while let Some((sequence_id, mut handle)) = pending.pop_front() {
            let outcome = loop {
                tokio::select! {
                    res = &mut handle => break res,
                    _ = cancel.cancelled() => {
                        handle.abort();
                        abort_all(&pending);
                        warn!(
                            "Drain cancelled: {} rows already committed will not be rolled back",
                            report.rows
                        );
                        report.interrupted = Some(MigrateError::Interrupted(format!(
                            "cancelled with {} batch writes outstanding",
                            pending.len() + 1
                        )));
                        return report;
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        windows += 1;
                        warn!(
                            "Still waiting for {} of {} batch writes after {:?}",
                            pending.len() + 1,
                            total,
                            policy.window * windows
                        );
                        if policy.patience.is_some_and(|p| windows >= p) {
                            handle.abort();
                            abort_all(&pending);
                            warn!(
                                "Drain gave up: {} rows already committed will not be rolled back",
                                report.rows
                            );
                            report.interrupted = Some(MigrateError::Interrupted(format!(
                                "{} batch writes still outstanding after {} drain windows",
                                pending.len() + 1,
                                windows
                            )));
                            return report;
                        }
                        deadline += policy.window;
                    }
                }
            };

            match outcome {
                Ok(Ok(rows)) => {
                    report.rows += rows;
                    report.batches += 1;
                }
                Ok(Err(e)) => {
                    error!("Batch {}: failed - {}", sequence_id, e);
                    report.failures.push((sequence_id, e));
                }
                Err(e) => {
                    error!("Batch {}: task panicked - {}", sequence_id, e);
                    report.failures.push((
                        sequence_id,
                        MigrateError::MigrationFailed(format!("write task panicked: {e}")),
                    ));
                }
            }
        }

        if report.failures.is_empty() {
            info!(
                "Drain complete: {} batches, {} rows committed",
                report.batches, report.rows
            );
            return report;
        }

        warn!(
            "{} of {} batches failed; {} rows from {} committed batches remain in the destination",
            report.failures.len(),
            total,
            report.rows,
            report.batches
        );
        report.failures.sort_by_key(|(seq, _)| *seq);
        report
    }
}

fn abort_all(pending: &VecDeque<(u64, JoinHandle<Result<u64>>)>) {
    for (_, handle) in pending {
        handle.abort();
    }
}
