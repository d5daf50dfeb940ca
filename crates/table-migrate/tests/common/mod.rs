//! In-memory source and destination used by the integration tests.
#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use table_migrate::core::{
    CatalogReader, Column, InsertStatement, Row, RowCursor, RowOutcome, SourceReader, SqlType,
    SqlValue, TableDescriptor, TargetWriter, WriteSession,
};
use table_migrate::drivers::PostgresDialect;
use table_migrate::error::{MigrateError, Result};
use table_migrate::{AutoConfirm, DrainPolicy, MigrationOptions, Orchestrator, ProgressSink};

type Key = (String, String);

fn key(schema: &str, table: &str) -> Key {
    (schema.to_string(), table.to_string())
}

#[derive(Debug, Clone)]
struct MemTable {
    columns: Vec<Column>,
    rows: Vec<Row>,
}

#[derive(Debug, Default)]
struct DbState {
    schemas: HashSet<String>,
    tables: HashMap<Key, MemTable>,
}

/// One in-memory database.
#[derive(Debug, Default)]
pub struct MemDb {
    state: Mutex<DbState>,
    /// Reported by `row_count` instead of the real count.
    count_override: Mutex<Option<u64>>,
    /// Rows whose first cell equals this id are rejected on insert.
    poison: Mutex<Option<i64>>,
    /// The cursor fails with a connection error after yielding this many rows.
    fail_fetch_after: Mutex<Option<usize>>,
    cursors_opened: AtomicUsize,
    cursors_closed: AtomicUsize,
    cursors_evicted: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl MemDb {
    pub fn new() -> Arc<Self> {
        let db = Self::default();
        db.state.lock().unwrap().schemas.insert("public".into());
        Arc::new(db)
    }

    pub fn add_schema(&self, schema: &str) {
        self.state.lock().unwrap().schemas.insert(schema.into());
    }

    pub fn add_table(&self, schema: &str, table: &str, columns: Vec<Column>, rows: Vec<Row>) {
        let mut state = self.state.lock().unwrap();
        state.schemas.insert(schema.into());
        state
            .tables
            .insert(key(schema, table), MemTable { columns, rows });
    }

    pub fn drop_table(&self, schema: &str, table: &str) {
        self.state.lock().unwrap().tables.remove(&key(schema, table));
    }

    pub fn rows(&self, schema: &str, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(&key(schema, table))
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    pub fn set_count_override(&self, count: u64) {
        *self.count_override.lock().unwrap() = Some(count);
    }

    pub fn set_poison(&self, id: i64) {
        *self.poison.lock().unwrap() = Some(id);
    }

    pub fn fail_fetch_after(&self, rows: usize) {
        *self.fail_fetch_after.lock().unwrap() = Some(rows);
    }

    pub fn cursors_opened(&self) -> usize {
        self.cursors_opened.load(Ordering::SeqCst)
    }

    /// Cursors whose connection went back to the pool.
    pub fn cursors_closed(&self) -> usize {
        self.cursors_closed.load(Ordering::SeqCst)
    }

    /// Cursors whose connection was discarded.
    pub fn cursors_evicted(&self) -> usize {
        self.cursors_evicted.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    fn schema_exists(&self, schema: &str) -> bool {
        self.state.lock().unwrap().schemas.contains(schema)
    }

    fn table_exists(&self, schema: &str, table: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .tables
            .contains_key(&key(schema, table))
    }

    fn columns(&self, schema: &str, table: &str) -> Vec<Column> {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(&key(schema, table))
            .map(|t| t.columns.clone())
            .unwrap_or_default()
    }

    fn is_poisoned(&self, row: &Row) -> bool {
        match (*self.poison.lock().unwrap(), row.first()) {
            (Some(p), Some(SqlValue::I64(id))) => *id == p,
            _ => false,
        }
    }
}

/// Source side over a [`MemDb`].
pub struct MemSource {
    db: Arc<MemDb>,
}

impl MemSource {
    pub fn new(db: Arc<MemDb>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CatalogReader for MemSource {
    async fn schema_exists(&self, schema: &str) -> Result<bool> {
        Ok(self.db.schema_exists(schema))
    }

    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
        Ok(self.db.table_exists(schema, table))
    }

    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<Column>> {
        Ok(self.db.columns(schema, table))
    }
}

#[async_trait]
impl SourceReader for MemSource {
    async fn row_count(&self, table: &TableDescriptor) -> Result<u64> {
        if let Some(count) = *self.db.count_override.lock().unwrap() {
            return Ok(count);
        }
        Ok(self.db.rows(&table.schema, &table.table).len() as u64)
    }

    async fn open_cursor(
        &self,
        table: &TableDescriptor,
        columns: &[String],
        _fetch_size: usize,
    ) -> Result<Box<dyn RowCursor>> {
        self.db.cursors_opened.fetch_add(1, Ordering::SeqCst);
        let source_columns = self.db.columns(&table.schema, &table.table);
        let positions = columns
            .iter()
            .map(|name| {
                source_columns
                    .iter()
                    .position(|c| &c.name == name)
                    .ok_or_else(|| MigrateError::MigrationFailed(format!("no column {name}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let rows = self
            .db
            .rows(&table.schema, &table.table)
            .into_iter()
            .map(|row| positions.iter().map(|&i| row[i].clone()).collect())
            .collect();
        let fail_after = *self.db.fail_fetch_after.lock().unwrap();
        Ok(Box::new(MemCursor {
            db: self.db.clone(),
            rows,
            fail_after,
            yielded: 0,
        }))
    }
}

struct MemCursor {
    db: Arc<MemDb>,
    rows: VecDeque<Row>,
    fail_after: Option<usize>,
    yielded: usize,
}

#[async_trait]
impl RowCursor for MemCursor {
    async fn next_row(&mut self) -> Result<Option<Row>> {
        if self.fail_after == Some(self.yielded) {
            return Err(MigrateError::connection(
                "server closed the connection unexpectedly",
                "fetching source rows",
            ));
        }
        let row = self.rows.pop_front();
        if row.is_some() {
            self.yielded += 1;
        }
        Ok(row)
    }

    async fn close(&mut self) -> Result<()> {
        self.db.cursors_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn evict(&mut self) {
        self.db.cursors_evicted.fetch_add(1, Ordering::SeqCst);
    }
}

/// Destination side over a [`MemDb`], writing to one table.
pub struct MemTarget {
    db: Arc<MemDb>,
    table: Key,
    pool_size: usize,
    write_delay: Option<Duration>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    begins: Arc<AtomicUsize>,
    lost_on_begin: Option<usize>,
}

impl MemTarget {
    pub fn new(db: Arc<MemDb>, schema: &str, table: &str, pool_size: usize) -> Self {
        Self {
            db,
            table: key(schema, table),
            pool_size,
            write_delay: None,
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            begins: Arc::new(AtomicUsize::new(0)),
            lost_on_begin: None,
        }
    }

    /// Fail the `n`th transaction start (1-based, clears included) as if
    /// the destination server had gone away.
    pub fn with_connection_lost_on_begin(mut self, n: usize) -> Self {
        self.lost_on_begin = Some(n);
        self
    }

    /// Make every insert take `delay`.
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Highest number of inserts observed in flight at once.
    pub fn peak_handle(&self) -> Arc<AtomicUsize> {
        self.peak.clone()
    }
}

#[async_trait]
impl CatalogReader for MemTarget {
    async fn schema_exists(&self, schema: &str) -> Result<bool> {
        Ok(self.db.schema_exists(schema))
    }

    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
        Ok(self.db.table_exists(schema, table))
    }

    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<Column>> {
        Ok(self.db.columns(schema, table))
    }
}

#[async_trait]
impl TargetWriter for MemTarget {
    fn pool_size(&self) -> usize {
        self.pool_size
    }

    async fn begin(&self) -> Result<Box<dyn WriteSession>> {
        let n = self.begins.fetch_add(1, Ordering::SeqCst) + 1;
        if self.lost_on_begin == Some(n) {
            return Err(MigrateError::connection(
                "connection refused",
                "getting destination connection",
            ));
        }
        Ok(Box::new(MemSession {
            db: self.db.clone(),
            table: self.table.clone(),
            write_delay: self.write_delay,
            active: self.active.clone(),
            peak: self.peak.clone(),
            clear: false,
            staged: Vec::new(),
        }))
    }
}

struct MemSession {
    db: Arc<MemDb>,
    table: Key,
    write_delay: Option<Duration>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    clear: bool,
    staged: Vec<Row>,
}

#[async_trait]
impl WriteSession for MemSession {
    async fn clear_table(&mut self, _table: &TableDescriptor) -> Result<u64> {
        let existing = self.db.rows(&self.table.0, &self.table.1).len() as u64;
        let deleted = if self.clear { 0 } else { existing } + self.staged.len() as u64;
        self.clear = true;
        self.staged.clear();
        Ok(deleted)
    }

    async fn insert_rows(
        &mut self,
        _stmt: &InsertStatement,
        rows: &[Row],
    ) -> Result<Vec<RowOutcome>> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.write_delay {
            tokio::time::sleep(delay).await;
        }

        let outcomes = rows
            .iter()
            .map(|row| {
                if self.db.is_poisoned(row) {
                    RowOutcome::Failed("duplicate key value violates unique constraint".into())
                } else {
                    self.staged.push(row.clone());
                    RowOutcome::Inserted(1)
                }
            })
            .collect();
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(outcomes)
    }

    async fn commit(&mut self) -> Result<()> {
        let mut state = self.db.state.lock().unwrap();
        if let Some(table) = state.tables.get_mut(&self.table) {
            if self.clear {
                table.rows.clear();
            }
            table.rows.append(&mut self.staged);
        }
        self.db.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.staged.clear();
        self.clear = false;
        self.db.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Sums every `advance` call.
#[derive(Debug, Default)]
pub struct CountingProgress {
    pub total: AtomicU64,
    pub advanced: AtomicU64,
    pub finished: AtomicUsize,
}

impl ProgressSink for CountingProgress {
    fn start(&self, total: u64) {
        self.total.store(total, Ordering::SeqCst);
    }

    fn advance(&self, rows: u64) {
        self.advanced.fetch_add(rows, Ordering::SeqCst);
    }

    fn finish(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn order_columns() -> Vec<Column> {
    vec![
        Column::new("id", SqlType::BigInt, 1),
        Column::new("customer", SqlType::Varchar, 2),
    ]
}

pub fn order_rows(ids: std::ops::Range<i64>) -> Vec<Row> {
    ids.map(|i| {
        vec![
            SqlValue::I64(i),
            SqlValue::text_owned(format!("customer {i}")),
        ]
    })
    .collect()
}

/// First-cell ids of `rows`.
pub fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter()
        .map(|row| match row.first() {
            Some(SqlValue::I64(id)) => *id,
            other => panic!("unexpected id cell {other:?}"),
        })
        .collect()
}

pub fn options(batch_size: usize) -> MigrationOptions {
    MigrationOptions {
        source_schema: "public".into(),
        source_table: "orders".into(),
        destination_schema: "public".into(),
        destination_table: "orders".into(),
        batch_size,
        append: false,
        large_table_confirmation: true,
        single_transaction: false,
        drain: DrainPolicy::default(),
    }
}

/// A source `public.orders` with `rows` rows and an empty destination
/// `public.orders` with the same columns.
pub struct Harness {
    pub source: Arc<MemDb>,
    pub destination: Arc<MemDb>,
    pub pool_size: usize,
}

impl Harness {
    pub fn new(rows: i64) -> Self {
        let source = MemDb::new();
        source.add_table("public", "orders", order_columns(), order_rows(0..rows));
        let destination = MemDb::new();
        destination.add_table("public", "orders", order_columns(), Vec::new());
        Self {
            source,
            destination,
            pool_size: 3,
        }
    }

    pub fn target(&self) -> MemTarget {
        MemTarget::new(self.destination.clone(), "public", "orders", self.pool_size)
    }

    pub fn orchestrator(&self, options: MigrationOptions) -> Orchestrator {
        self.orchestrator_with(self.target(), options)
    }

    pub fn orchestrator_with(&self, target: MemTarget, options: MigrationOptions) -> Orchestrator {
        Orchestrator::new(
            Arc::new(MemSource::new(self.source.clone())),
            Arc::new(target),
            Arc::new(PostgresDialect::new()),
            options,
        )
        .with_confirmation(Arc::new(AutoConfirm))
    }

    pub fn destination_ids(&self) -> Vec<i64> {
        ids(&self.destination.rows("public", "orders"))
    }
}
