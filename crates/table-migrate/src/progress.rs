//! Progress reporting sinks.
//!
//! Sinks are purely observational: nothing they do affects the run. Progress
//! is keyed to the row count taken before extraction started, so `done` may
//! exceed `total` if the source grew in the meantime.

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use serde::Serialize;
use tracing::info;

/// Receives progress events from a run.
pub trait ProgressSink: Send + Sync {
    /// Extraction is about to start on `total` expected rows.
    fn start(&self, total: u64);

    /// `rows` more rows were read and handed to a writer.
    fn advance(&self, rows: u64);

    /// The run is over, successfully or not.
    fn finish(&self);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn start(&self, _total: u64) {}
    fn advance(&self, _rows: u64) {}
    fn finish(&self) {}
}

/// Shared counters behind the reporting sinks.
#[derive(Debug, Default)]
struct Counter {
    total: AtomicU64,
    done: AtomicU64,
    started: Mutex<Option<Instant>>,
}

impl Counter {
    fn start(&self, total: u64) {
        self.total.store(total, Ordering::Relaxed);
        self.done.store(0, Ordering::Relaxed);
        if let Ok(mut started) = self.started.lock() {
            *started = Some(Instant::now());
        }
    }

    /// Add rows, returning (before, after).
    fn add(&self, rows: u64) -> (u64, u64) {
        let before = self.done.fetch_add(rows, Ordering::Relaxed);
        (before, before + rows)
    }

    fn snapshot(&self) -> ProgressUpdate {
        let total = self.total.load(Ordering::Relaxed);
        let done = self.done.load(Ordering::Relaxed);
        let elapsed = self
            .started
            .lock()
            .ok()
            .and_then(|s| s.map(|t| t.elapsed().as_secs_f64()))
            .unwrap_or(0.0);

        ProgressUpdate {
            rows_done: done,
            rows_total: total,
            percent: percent(done, total),
            rows_per_second: if elapsed > 0.0 {
                (done as f64 / elapsed) as u64
            } else {
                0
            },
        }
    }
}

fn percent(done: u64, total: u64) -> f64 {
    if total == 0 {
        100.0
    } else {
        (done as f64 / total as f64 * 100.0).min(100.0)
    }
}

/// One progress event as emitted by [`JsonProgress`].
#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub rows_done: u64,
    pub rows_total: u64,
    pub percent: f64,
    pub rows_per_second: u64,
}

/// Logs an info line every time another tenth of the table is read.
#[derive(Debug, Default)]
pub struct LogProgress {
    counter: Counter,
}

impl ProgressSink for LogProgress {
    fn start(&self, total: u64) {
        self.counter.start(total);
        info!("Migrating {} rows", total);
    }

    fn advance(&self, rows: u64) {
        let (before, after) = self.counter.add(rows);
        let total = self.counter.total.load(Ordering::Relaxed);
        let step = (total / 10).max(1);
        if before / step != after / step {
            let update = self.counter.snapshot();
            info!(
                "Progress: {}/{} rows ({:.0}%, {} rows/s)",
                update.rows_done, update.rows_total, update.percent, update.rows_per_second
            );
        }
    }

    fn finish(&self) {
        let update = self.counter.snapshot();
        info!("Read {} of {} rows", update.rows_done, update.rows_total);
    }
}

/// Writes one JSON object per event to a writer (stderr by default).
pub struct JsonProgress {
    counter: Counter,
    out: Mutex<Box<dyn Write + Send>>,
}

impl JsonProgress {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            counter: Counter::default(),
            out: Mutex::new(out),
        }
    }

    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    fn emit(&self) {
        let update = self.counter.snapshot();
        if let (Ok(line), Ok(mut out)) = (serde_json::to_string(&update), self.out.lock()) {
            let _ = writeln!(out, "{line}");
            let _ = out.flush();
        }
    }
}

impl ProgressSink for JsonProgress {
    fn start(&self, total: u64) {
        self.counter.start(total);
        self.emit();
    }

    fn advance(&self, rows: u64) {
        self.counter.add(rows);
        self.emit();
    }

    fn finish(&self) {
        self.emit();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[derive(Clone, Default)]
    struct Lines(Arc<Mutex<Vec<u8>>>);

    impl Write for Lines {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 0), 100.0);
        assert_eq!(percent(250, 1000), 25.0);
        assert_eq!(percent(1200, 1000), 100.0);
    }

    #[test]
    fn test_json_progress_emits_one_line_per_event() {
        let lines = Lines::default();
        let sink = JsonProgress::new(Box::new(lines.clone()));
        sink.start(2500);
        sink.advance(1000);
        sink.advance(1000);
        sink.advance(500);
        sink.finish();

        let text = String::from_utf8(lines.0.lock().unwrap().clone()).unwrap();
        let events: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(events.len(), 5);
        assert_eq!(events[0]["rows_done"], 0);
        assert_eq!(events[1]["rows_done"], 1000);
        assert_eq!(events[4]["rows_done"], 2500);
        assert_eq!(events[4]["rows_total"], 2500);
        assert_eq!(events[4]["percent"], 100.0);
    }

    #[test]
    fn test_log_progress_counts() {
        let sink = LogProgress::default();
        sink.start(10);
        sink.advance(3);
        sink.advance(7);
        sink.finish();
        let update = sink.counter.snapshot();
        assert_eq!(update.rows_done, 10);
        assert_eq!(update.percent, 100.0);
    }
}
