//! PostgreSQL source reader.
//!
//! Rows are streamed through a server-side `NO SCROLL` cursor inside a
//! read-only transaction, so the client holds at most one fetch of rows at
//! a time regardless of table size.

use std::collections::VecDeque;

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use tracing::{debug, warn};

use super::value::is_text_transported;
use super::{catalog, create_pool, decode_row, PostgresDialect};
use crate::config::DatabaseConfig;
use crate::core::{CatalogReader, Column, Dialect, Row, RowCursor, SourceReader, TableDescriptor};
use crate::error::{MigrateError, Result};

const CURSOR_NAME: &str = "table_migrate_cursor";

/// PostgreSQL source reader implementation.
pub struct PgSource {
    pool: Pool,
    dialect: PostgresDialect,
}

impl PgSource {
    /// Create the source pool and check that it connects.
    pub async fn connect(config: &DatabaseConfig, max_size: usize) -> Result<Self> {
        Ok(Self::from_pool(create_pool(config, max_size, "source").await?))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: Pool) -> Self {
        Self {
            pool,
            dialect: PostgresDialect::new(),
        }
    }

    async fn get_client(&self, context: &str) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::connection(e, context))
    }
}

#[async_trait]
impl CatalogReader for PgSource {
    async fn schema_exists(&self, schema: &str) -> Result<bool> {
        catalog::schema_exists(&self.pool, schema).await
    }

    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool> {
        catalog::table_exists(&self.pool, schema, table).await
    }

    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<Column>> {
        catalog::columns(&self.pool, schema, table).await
    }
}

#[async_trait]
impl SourceReader for PgSource {
    async fn row_count(&self, table: &TableDescriptor) -> Result<u64> {
        let client = self.get_client("getting connection for row count").await?;
        let sql = format!(
            "SELECT COUNT(*) FROM {}",
            self.dialect.qualify(&table.schema, &table.table)
        );
        let row = client.query_one(&sql, &[]).await?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as u64)
    }

    async fn open_cursor(
        &self,
        table: &TableDescriptor,
        columns: &[String],
        fetch_size: usize,
    ) -> Result<Box<dyn RowCursor>> {
        let client = self.get_client("getting connection for source cursor").await?;

        let select = select_statement(&self.dialect, table, columns);
        let open = format!("BEGIN READ ONLY; DECLARE {CURSOR_NAME} NO SCROLL CURSOR FOR {select}");

        if let Err(e) = client.batch_execute(&open).await {
            // Connection may be left inside an aborted transaction
            drop(Object::take(client));
            return Err(e.into());
        }
        debug!("Opened cursor on {} (fetch size {})", table.full_name(), fetch_size);

        Ok(Box::new(PgCursor {
            client: Some(client),
            fetch: format!("FETCH FORWARD {} FROM {CURSOR_NAME}", fetch_size.max(1)),
            fetch_size: fetch_size.max(1),
            buffer: VecDeque::new(),
            done: false,
        }))
    }
}

/// `SELECT` over `columns` in the given order, casting to text every column
/// without a native decoding.
fn select_statement(dialect: &PostgresDialect, table: &TableDescriptor, columns: &[String]) -> String {
    let list = columns
        .iter()
        .map(|name| {
            let quoted = dialect.quote_ident(name);
            match table.column(name) {
                Some(column) if is_text_transported(column) => format!("{quoted}::text AS {quoted}"),
                _ => quoted,
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT {} FROM {}", list, dialect.qualify(&table.schema, &table.table))
}

/// A server-side cursor holding one pooled connection.
pub struct PgCursor {
    client: Option<Object>,
    fetch: String,
    fetch_size: usize,
    buffer: VecDeque<Row>,
    done: bool,
}

#[async_trait]
impl RowCursor for PgCursor {
    async fn next_row(&mut self) -> Result<Option<Row>> {
        if let Some(row) = self.buffer.pop_front() {
            return Ok(Some(row));
        }
        if self.done {
            return Ok(None);
        }

        let client = self
            .client
            .as_ref()
            .ok_or_else(|| MigrateError::MigrationFailed("source cursor already released".into()))?;
        let rows = client.query(self.fetch.as_str(), &[]).await?;
        if rows.len() < self.fetch_size {
            self.done = true;
        }
        for row in &rows {
            self.buffer.push_back(decode_row(row)?);
        }
        Ok(self.buffer.pop_front())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(client) = self.client.take() {
            if let Err(e) = client.batch_execute(&format!("CLOSE {CURSOR_NAME}; COMMIT")).await {
                drop(Object::take(client));
                return Err(e.into());
            }
        }
        Ok(())
    }

    fn evict(&mut self) {
        if let Some(client) = self.client.take() {
            drop(Object::take(client));
        }
    }
}

impl Drop for PgCursor {
    fn drop(&mut self) {
        if self.client.is_some() {
            warn!("Source cursor dropped while open; discarding its connection");
            self.evict();
        }
    }
}
