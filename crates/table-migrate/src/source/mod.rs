//! Source extraction: pull rows from a cursor and cut them into batches.
//!
//! Extraction is single-threaded. Rows come off the cursor in cursor order
//! and are assembled into batches in that same order.

use tracing::{debug, warn};

use crate::core::{Batch, Row, RowCursor};
use crate::error::Result;

/// Accumulates rows and decides when a batch is complete.
///
/// A batch is flushed when it reaches `batch_size` rows, or when it holds
/// every row still expected according to the initial count. Rows beyond the
/// expected count (the table grew after it was counted) are still batched
/// and come out of [`BatchAccumulator::finish`].
#[derive(Debug)]
pub struct BatchAccumulator {
    batch_size: usize,
    remaining: u64,
    next_sequence: u64,
    rows: Vec<Row>,
}

impl BatchAccumulator {
    pub fn new(batch_size: usize, expected_rows: u64) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            batch_size,
            remaining: expected_rows,
            next_sequence: 1,
            rows: Vec::with_capacity(batch_size.min(expected_rows.max(1) as usize)),
        }
    }

    /// Add a row, returning a batch if this row completed one.
    pub fn push(&mut self, row: Row) -> Option<Batch> {
        self.rows.push(row);
        let len = self.rows.len();
        if len >= self.batch_size || len as u64 == self.remaining {
            Some(self.flush())
        } else {
            None
        }
    }

    /// Flush whatever is left once the cursor is exhausted.
    pub fn finish(&mut self) -> Option<Batch> {
        if self.rows.is_empty() {
            None
        } else {
            Some(self.flush())
        }
    }

    /// Rows still expected according to the initial count.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    fn flush(&mut self) -> Batch {
        let rows = std::mem::replace(&mut self.rows, Vec::with_capacity(self.batch_size));
        self.remaining = self.remaining.saturating_sub(rows.len() as u64);
        let batch = Batch::new(self.next_sequence, rows);
        self.next_sequence += 1;
        batch
    }
}

/// Reads a cursor to completion one batch at a time.
pub struct BatchReader {
    cursor: Box<dyn RowCursor>,
    acc: BatchAccumulator,
    rows_read: u64,
    exhausted: bool,
    failed: bool,
}

impl BatchReader {
    pub fn new(cursor: Box<dyn RowCursor>, batch_size: usize, expected_rows: u64) -> Self {
        Self {
            cursor,
            acc: BatchAccumulator::new(batch_size, expected_rows),
            rows_read: 0,
            exhausted: false,
            failed: false,
        }
    }

    /// Next complete batch, or `None` once the cursor is exhausted.
    pub async fn next_batch(&mut self) -> Result<Option<Batch>> {
        while !self.exhausted {
            let next = match self.cursor.next_row().await {
                Ok(next) => next,
                Err(e) => {
                    self.failed = true;
                    return Err(e);
                }
            };
            match next {
                Some(row) => {
                    self.rows_read += 1;
                    if let Some(batch) = self.acc.push(row) {
                        return Ok(Some(batch));
                    }
                }
                None => {
                    self.exhausted = true;
                    if self.acc.remaining() > 0 {
                        debug!(
                            "Cursor exhausted with {} expected rows not seen",
                            self.acc.remaining()
                        );
                    }
                }
            }
        }
        Ok(self.acc.finish())
    }

    /// Total rows pulled from the cursor so far.
    pub fn rows_read(&self) -> u64 {
        self.rows_read
    }

    /// Give the source connection back.
    ///
    /// A cursor that failed mid-stream is evicted rather than returned to
    /// its pool, since the connection's state is unknown.
    pub async fn release(mut self) -> Result<()> {
        if self.failed {
            warn!("Evicting source connection after a failed fetch");
            self.cursor.evict();
            return Ok(());
        }
        if let Err(e) = self.cursor.close().await {
            self.cursor.evict();
            return Err(e);
        }
        Ok(())
    }
}
