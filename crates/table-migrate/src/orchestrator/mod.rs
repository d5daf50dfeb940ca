//! Migration orchestrator - main workflow coordinator.
//!
//! A run is: validate both tables, count the source, confirm if large,
//! clear the destination unless appending, stream batches through the
//! sequential or concurrent write path, report. Every failure along the
//! way ends up in the returned [`MigrationResult`]; `run` itself never
//! errors and never terminates the process.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::confirm::{ConfirmationGate, PromptConfirmation, LARGE_TABLE_THRESHOLD};
use crate::core::{
    Dialect, InsertStatement, SourceReader, SqlType, TableDescriptor, TargetWriter, WriteSession,
};
use crate::drivers::postgres::{PgSource, PgTarget, PostgresDialect};
use crate::error::{FailureKind, MigrateError, Result};
use crate::progress::{NoProgress, ProgressSink};
use crate::source::BatchReader;
use crate::target::BatchWriter;
use crate::transfer::{DrainPolicy, WritePool};
use crate::validator::SchemaValidator;

/// How batches are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Extraction waits for each insert.
    Sequential,
    /// Batches are handed to a bounded pool of writers.
    Concurrent,
}

impl ExecutionMode {
    pub fn from_multithreaded(multithreaded: bool) -> Self {
        if multithreaded {
            ExecutionMode::Concurrent
        } else {
            ExecutionMode::Sequential
        }
    }
}

/// Tunables for one run.
#[derive(Debug, Clone)]
pub struct MigrationOptions {
    pub source_schema: String,
    pub source_table: String,
    pub destination_schema: String,
    pub destination_table: String,
    /// Rows per batch and cursor fetch size.
    pub batch_size: usize,
    /// Keep existing destination rows.
    pub append: bool,
    /// Ask before migrating more than [`LARGE_TABLE_THRESHOLD`] rows.
    pub large_table_confirmation: bool,
    /// Sequential mode only: one destination transaction for the whole run.
    pub single_transaction: bool,
    pub drain: DrainPolicy,
}

impl MigrationOptions {
    pub fn from_config(config: &Config) -> Self {
        let m = &config.migration;
        Self {
            source_schema: config.source.schema.clone(),
            source_table: config.source.table.clone(),
            destination_schema: config.destination.schema.clone(),
            destination_table: config.destination.table.clone(),
            batch_size: m.batch_size,
            append: m.append,
            large_table_confirmation: m.large_table_confirmation,
            single_transaction: m.single_transaction,
            drain: DrainPolicy {
                window: Duration::from_secs(m.drain_window_secs),
                patience: m.drain_patience,
            },
        }
    }
}

/// Immutable per-run state shared by every writer.
#[derive(Debug)]
pub struct RunContext {
    pub source: TableDescriptor,
    pub destination: TableDescriptor,
    /// Destination column names; the source is read in this order.
    pub columns: Vec<String>,
    pub types: Vec<SqlType>,
    pub insert: Arc<InsertStatement>,
}

/// Why a run failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    pub mode: ExecutionMode,

    pub success: bool,

    pub source_table: String,

    pub destination_table: String,

    /// Source row count taken before extraction, if reached.
    pub rows_expected: Option<u64>,

    /// Rows committed to the destination by this run.
    pub rows_migrated: u64,

    /// Batches committed.
    pub batches: u64,

    /// Wall time of the whole run in milliseconds, validation and
    /// confirmation included.
    pub elapsed_ms: u64,

    /// Milliseconds from opening the source cursor to the last write.
    pub copy_elapsed_ms: u64,

    /// Average throughput over the copy phase.
    pub rows_per_second: u64,

    pub started_at: DateTime<Utc>,

    pub completed_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Process exit code: 0 on success, otherwise per failure kind.
    pub fn exit_code(&self) -> u8 {
        match &self.failure {
            None => 0,
            Some(f) => f.kind.exit_code(),
        }
    }
}

/// Result of a connectivity check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub destination_connected: bool,
    pub destination_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_error: Option<String>,
    pub healthy: bool,
}

/// Result of validating both tables without moving data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub source: TableDescriptor,
    pub destination: TableDescriptor,
    pub source_rows: u64,
    pub requires_confirmation: bool,
}

/// Counters that survive a failed run.
#[derive(Debug, Default)]
struct RunStats {
    rows_expected: Option<u64>,
    rows: u64,
    batches: u64,
    copy_started: Option<Instant>,
}

/// Migration orchestrator.
pub struct Orchestrator {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    dialect: Arc<dyn Dialect>,
    options: MigrationOptions,
    gate: Arc<dyn ConfirmationGate>,
    progress: Arc<dyn ProgressSink>,
}

impl Orchestrator {
    /// Connect to both PostgreSQL databases described by `config`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let source = PgSource::connect(&config.source, config.source_pool_size()).await?;
        let target = PgTarget::connect(&config.destination, config.destination_pool_size()).await?;

        Ok(Self::new(
            Arc::new(source),
            Arc::new(target),
            Arc::new(PostgresDialect::new()),
            MigrationOptions::from_config(config),
        ))
    }

    /// Build an orchestrator over any driver.
    ///
    /// Defaults to an interactive prompt on stdin and no progress output.
    pub fn new(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        dialect: Arc<dyn Dialect>,
        options: MigrationOptions,
    ) -> Self {
        Self {
            source,
            target,
            dialect,
            options,
            gate: Arc::new(PromptConfirmation::stdio()),
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_confirmation(mut self, gate: Arc<dyn ConfirmationGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub fn options(&self) -> &MigrationOptions {
        &self.options
    }

    /// Run the migration.
    pub async fn run(&self, mode: ExecutionMode, cancel: CancellationToken) -> MigrationResult {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let start = Instant::now();
        let mut stats = RunStats::default();

        info!(
            "Starting migration {} ({:?}): {}.{} -> {}.{}",
            run_id,
            mode,
            self.options.source_schema,
            self.options.source_table,
            self.options.destination_schema,
            self.options.destination_table
        );

        let outcome = self.execute(mode, &cancel, &mut stats).await;
        self.progress.finish();

        let elapsed_ms = start.elapsed().as_millis() as u64;
        let copy_elapsed = stats
            .copy_started
            .map(|t| t.elapsed())
            .unwrap_or_default();
        let rows_per_second = if copy_elapsed.as_secs_f64() > 0.0 {
            (stats.rows as f64 / copy_elapsed.as_secs_f64()) as u64
        } else {
            0
        };

        let failure = match outcome {
            Ok(()) => {
                info!(
                    "Migration {} completed: {} rows in {} batches, {} ms ({} rows/s)",
                    run_id, stats.rows, stats.batches, elapsed_ms, rows_per_second
                );
                None
            }
            Err(e) => {
                error!("Migration {} failed: {}", run_id, e.format_detailed());
                if stats.rows > 0 {
                    warn!(
                        "{} rows were committed to {}.{} before the failure and remain there",
                        stats.rows, self.options.destination_schema, self.options.destination_table
                    );
                }
                Some(Failure {
                    kind: e.kind(),
                    message: e.to_string(),
                })
            }
        };

        MigrationResult {
            run_id,
            mode,
            success: failure.is_none(),
            source_table: format!("{}.{}", self.options.source_schema, self.options.source_table),
            destination_table: format!(
                "{}.{}",
                self.options.destination_schema, self.options.destination_table
            ),
            rows_expected: stats.rows_expected,
            rows_migrated: stats.rows,
            batches: stats.batches,
            elapsed_ms,
            copy_elapsed_ms: copy_elapsed.as_millis() as u64,
            rows_per_second,
            started_at,
            completed_at: Utc::now(),
            failure,
        }
    }

    /// Validate both tables and count the source without writing anything.
    pub async fn validate(&self) -> Result<ValidationReport> {
        let ctx = self.prepare().await?;
        let source_rows = self.source.row_count(&ctx.source).await?;
        Ok(ValidationReport {
            requires_confirmation: self.options.large_table_confirmation
                && source_rows > LARGE_TABLE_THRESHOLD,
            source: ctx.source,
            destination: ctx.destination,
            source_rows,
        })
    }

    /// Check that both databases answer a catalog query.
    pub async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let source = self.source.schema_exists(&self.options.source_schema).await;
        let source_latency_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let destination = self
            .target
            .schema_exists(&self.options.destination_schema)
            .await;
        let destination_latency_ms = start.elapsed().as_millis() as u64;

        let source_error = source.err().map(|e| e.to_string());
        let destination_error = destination.err().map(|e| e.to_string());

        HealthCheckResult {
            source_connected: source_error.is_none(),
            source_latency_ms,
            destination_connected: destination_error.is_none(),
            destination_latency_ms,
            healthy: source_error.is_none() && destination_error.is_none(),
            source_error,
            destination_error,
        }
    }

    /// Validate both tables and build the shared run context.
    async fn prepare(&self) -> Result<RunContext> {
        let o = &self.options;
        let source =
            SchemaValidator::validate(&o.source_schema, &o.source_table, self.source.as_ref())
                .await?;
        let destination = SchemaValidator::validate(
            &o.destination_schema,
            &o.destination_table,
            self.target.as_ref(),
        )
        .await?;
        SchemaValidator::check_columns(&source, &destination)?;

        let insert = Arc::new(InsertStatement::build(self.dialect.as_ref(), &destination));
        Ok(RunContext {
            columns: destination.column_names(),
            types: destination.column_types(),
            source,
            destination,
            insert,
        })
    }

    async fn execute(
        &self,
        mode: ExecutionMode,
        cancel: &CancellationToken,
        stats: &mut RunStats,
    ) -> Result<()> {
        info!("Phase 1: Validating source and destination tables");
        let ctx = Arc::new(self.prepare().await?);

        let total = self.source.row_count(&ctx.source).await?;
        stats.rows_expected = Some(total);
        info!("Source {} has {} rows", ctx.source.full_name(), total);

        if total > LARGE_TABLE_THRESHOLD && self.options.large_table_confirmation {
            self.confirm(total).await?;
        }

        let single_tx = self.options.single_transaction;
        if single_tx && mode == ExecutionMode::Concurrent {
            warn!("single_transaction is ignored in concurrent mode; each batch commits on its own");
        }

        match mode {
            ExecutionMode::Sequential if single_tx => {
                self.run_single_transaction(&ctx, total, cancel, stats).await
            }
            ExecutionMode::Sequential => {
                self.clear_destination(&ctx).await?;
                self.run_sequential(&ctx, total, cancel, stats).await
            }
            ExecutionMode::Concurrent => {
                self.clear_destination(&ctx).await?;
                self.run_concurrent(&ctx, total, cancel, stats).await
            }
        }
    }

    /// Ask the gate for approval off the async runtime, since prompts block.
    async fn confirm(&self, total: u64) -> Result<()> {
        warn!(
            "Source has {} rows, above the {} row large-table threshold",
            total, LARGE_TABLE_THRESHOLD
        );
        let gate = self.gate.clone();
        tokio::task::spawn_blocking(move || gate.confirm(total))
            .await
            .map_err(|e| MigrateError::MigrationFailed(format!("confirmation task failed: {e}")))?
    }

    async fn clear_destination(&self, ctx: &RunContext) -> Result<()> {
        if self.options.append {
            info!("Append mode: keeping existing rows in {}", ctx.destination.full_name());
            return Ok(());
        }
        let deleted = self.target.clear_table(&ctx.destination).await?;
        info!("Cleared {} rows from {}", deleted, ctx.destination.full_name());
        Ok(())
    }

    /// Open the source cursor and start the copy-phase clock.
    async fn open_reader(
        &self,
        ctx: &RunContext,
        total: u64,
        copy_started: &mut Option<Instant>,
    ) -> Result<BatchReader> {
        *copy_started = Some(Instant::now());
        let cursor = self
            .source
            .open_cursor(&ctx.source, &ctx.columns, self.options.batch_size)
            .await?;
        self.progress.start(total);
        Ok(BatchReader::new(cursor, self.options.batch_size, total))
    }

    async fn run_sequential(
        &self,
        ctx: &RunContext,
        total: u64,
        cancel: &CancellationToken,
        stats: &mut RunStats,
    ) -> Result<()> {
        info!(
            "Phase 2: Copying rows sequentially in batches of {}",
            self.options.batch_size
        );
        let writer = BatchWriter::new(self.target.clone(), ctx.insert.clone());
        let mut reader = self.open_reader(ctx, total, &mut stats.copy_started).await?;

        let streamed: Result<()> = async {
            while let Some(batch) = reader.next_batch().await? {
                check_cancelled(cancel)?;
                self.progress.advance(batch.len() as u64);
                stats.rows += writer.insert(&batch).await?;
                stats.batches += 1;
            }
            Ok::<_, MigrateError>(())
        }
        .await;

        finish_reader(reader, streamed).await
    }

    /// Sequential copy where the clear and every batch share one transaction.
    async fn run_single_transaction(
        &self,
        ctx: &RunContext,
        total: u64,
        cancel: &CancellationToken,
        stats: &mut RunStats,
    ) -> Result<()> {
        info!(
            "Phase 2: Copying rows in a single destination transaction, batches of {}",
            self.options.batch_size
        );
        let writer = BatchWriter::new(self.target.clone(), ctx.insert.clone());
        let mut session = self.target.begin().await?;
        let copy_started = &mut stats.copy_started;

        let written: Result<(u64, u64)> = async {
            if self.options.append {
                info!("Append mode: keeping existing rows in {}", ctx.destination.full_name());
            } else {
                let deleted = session.clear_table(&ctx.destination).await?;
                info!(
                    "Cleared {} rows from {} (uncommitted)",
                    deleted,
                    ctx.destination.full_name()
                );
            }

            let mut reader = self.open_reader(ctx, total, copy_started).await?;
            let mut rows = 0;
            let mut batches = 0;
            let streamed: Result<()> = async {
                while let Some(batch) = reader.next_batch().await? {
                    check_cancelled(cancel)?;
                    self.progress.advance(batch.len() as u64);
                    rows += writer.insert_in(session.as_mut(), &batch).await?;
                    batches += 1;
                }
                Ok::<_, MigrateError>(())
            }
            .await;
            finish_reader(reader, streamed).await?;
            Ok::<_, MigrateError>((rows, batches))
        }
        .await;

        match written {
            Ok((rows, batches)) => {
                session.commit().await?;
                stats.rows = rows;
                stats.batches = batches;
                Ok(())
            }
            Err(e) => {
                rollback(session.as_mut()).await;
                Err(e)
            }
        }
    }

    async fn run_concurrent(
        &self,
        ctx: &RunContext,
        total: u64,
        cancel: &CancellationToken,
        stats: &mut RunStats,
    ) -> Result<()> {
        let workers = self.target.pool_size();
        info!(
            "Phase 2: Copying rows with {} concurrent writers in batches of {}",
            workers, self.options.batch_size
        );
        let writer = BatchWriter::new(self.target.clone(), ctx.insert.clone());
        let mut pool = WritePool::new(writer, workers);
        let mut reader = self.open_reader(ctx, total, &mut stats.copy_started).await?;

        let streamed: Result<()> = async {
            while let Some(batch) = reader.next_batch().await? {
                check_cancelled(cancel)?;
                self.progress.advance(batch.len() as u64);
                pool.submit(batch);
            }
            Ok::<_, MigrateError>(())
        }
        .await;
        let extracted = finish_reader(reader, streamed).await;

        info!("Phase 3: Waiting for {} batch writes", pool.submitted());
        let report = pool.drain(self.options.drain, cancel).await;
        stats.rows = report.rows;
        stats.batches = report.batches;

        // An extraction failure outranks the write outcomes it caused.
        extracted?;
        report.into_result().map(|_| ())
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        return Err(MigrateError::Interrupted(
            "cancellation requested during extraction".into(),
        ));
    }
    Ok(())
}

/// Release the source connection, keeping the streaming error if there was one.
async fn finish_reader(reader: BatchReader, streamed: Result<()>) -> Result<()> {
    let rows_read = reader.rows_read();
    let released = reader.release().await;
    streamed?;
    released?;
    info!("Extraction complete: {} rows read", rows_read);
    Ok(())
}

async fn rollback(session: &mut dyn WriteSession) {
    match session.rollback().await {
        Ok(()) => warn!("Destination transaction rolled back"),
        Err(e) => error!("Failed to roll back destination transaction: {}", e),
    }
}
