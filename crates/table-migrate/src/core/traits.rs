//! Boundary traits between the migration engine and a database driver.
//!
//! - [`CatalogReader`]: read-only metadata lookups used by validation
//! - [`SourceReader`]: row count and forward-only cursor over the source
//! - [`RowCursor`]: pull rows one at a time from an open cursor
//! - [`TargetWriter`]: destination pool with transactional write sessions
//! - [`WriteSession`]: one open destination transaction
//! - [`Dialect`]: SQL syntax strategy
//!
//! The engine only ever talks to these traits, so it can be driven by the
//! PostgreSQL driver in production and by in-memory fakes in tests.

use async_trait::async_trait;

use crate::error::Result;

use super::schema::{Column, SqlType, TableDescriptor};
use super::value::Row;

/// Read-only catalog lookups.
///
/// Implementations must answer from an autocommit connection that is not
/// taking part in any data transaction.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Check whether a schema exists.
    async fn schema_exists(&self, schema: &str) -> Result<bool>;

    /// Check whether a table exists within a schema.
    async fn table_exists(&self, schema: &str, table: &str) -> Result<bool>;

    /// List columns in ordinal order.
    async fn columns(&self, schema: &str, table: &str) -> Result<Vec<Column>>;
}

/// Read data from the source table.
#[async_trait]
pub trait SourceReader: CatalogReader {
    /// `SELECT COUNT(*)` on the table.
    async fn row_count(&self, table: &TableDescriptor) -> Result<u64>;

    /// Open a forward-only cursor over `SELECT * FROM table`.
    ///
    /// Rows are yielded with their values in the order of `columns` (the
    /// destination column order), fetched from the server `fetch_size` rows
    /// at a time. The cursor holds one dedicated source connection until it
    /// is closed or evicted.
    async fn open_cursor(
        &self,
        table: &TableDescriptor,
        columns: &[String],
        fetch_size: usize,
    ) -> Result<Box<dyn RowCursor>>;
}

/// A forward-only cursor.
#[async_trait]
pub trait RowCursor: Send {
    /// Next row, or `None` once the cursor is exhausted.
    async fn next_row(&mut self) -> Result<Option<Row>>;

    /// Close the cursor and return its connection to the pool.
    async fn close(&mut self) -> Result<()>;

    /// Drop the cursor's connection without returning it to the pool.
    ///
    /// Used after a mid-stream failure, when the connection state is unknown.
    fn evict(&mut self);
}

/// Outcome of one row within a batched insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    /// Row accepted; the count reported by the server.
    Inserted(u64),
    /// Row rejected by the server.
    Failed(String),
}

impl RowOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, RowOutcome::Failed(_))
    }
}

/// One open destination transaction on a pooled connection.
#[async_trait]
pub trait WriteSession: Send {
    /// Delete every row from the table inside this transaction.
    async fn clear_table(&mut self, table: &TableDescriptor) -> Result<u64>;

    /// Execute `stmt` once per row, pipelined, returning one outcome per row.
    ///
    /// A driver error that prevents execution altogether is returned as `Err`.
    async fn insert_rows(&mut self, stmt: &InsertStatement, rows: &[Row])
        -> Result<Vec<RowOutcome>>;

    /// Commit and release the connection.
    async fn commit(&mut self) -> Result<()>;

    /// Roll back and release the connection.
    async fn rollback(&mut self) -> Result<()>;
}

/// Write to the destination table.
#[async_trait]
pub trait TargetWriter: CatalogReader {
    /// Maximum size of the destination connection pool.
    fn pool_size(&self) -> usize;

    /// Start a transaction on a pooled connection.
    async fn begin(&self) -> Result<Box<dyn WriteSession>>;

    /// Clear the table in a transaction of its own.
    ///
    /// Use [`WriteSession::clear_table`] to take part in a caller's
    /// transaction instead.
    async fn clear_table(&self, table: &TableDescriptor) -> Result<u64> {
        let mut session = self.begin().await?;
        match session.clear_table(table).await {
            Ok(deleted) => {
                session.commit().await?;
                Ok(deleted)
            }
            Err(e) => {
                let _ = session.rollback().await;
                Err(e)
            }
        }
    }

    /// Insert rows in a transaction of their own.
    ///
    /// Commits only when every row was accepted; otherwise rolls back and
    /// still returns the outcomes so the caller can report them.
    async fn insert_rows(&self, stmt: &InsertStatement, rows: &[Row]) -> Result<Vec<RowOutcome>> {
        let mut session = self.begin().await?;
        let outcomes = match session.insert_rows(stmt, rows).await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                let _ = session.rollback().await;
                return Err(e);
            }
        };

        if outcomes.iter().any(RowOutcome::is_failed) {
            session.rollback().await?;
        } else {
            session.commit().await?;
        }
        Ok(outcomes)
    }
}

/// SQL syntax strategy.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier (e.g., "postgres").
    fn name(&self) -> &str;

    /// Quote an identifier (table name, column name, etc.).
    fn quote_ident(&self, name: &str) -> String;

    /// Get a parameter placeholder for the given 1-based index.
    fn param_placeholder(&self, index: usize) -> String;

    /// Placeholder for the parameter bound to `column`.
    ///
    /// Dialects that carry some types as text override this to cast the
    /// parameter back to the column's type.
    fn column_param(&self, index: usize, _column: &Column) -> String {
        self.param_placeholder(index)
    }

    /// Quote a schema-qualified table name.
    fn qualify(&self, schema: &str, table: &str) -> String {
        format!("{}.{}", self.quote_ident(schema), self.quote_ident(table))
    }
}

/// A parameterized INSERT naming every destination column once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertStatement {
    /// Statement text with one placeholder per column.
    pub sql: String,
    /// Destination column names, in order.
    pub columns: Vec<String>,
    /// Destination column types, positionally paired with `columns`.
    pub types: Vec<SqlType>,
}

impl InsertStatement {
    /// Build the statement for a destination table.
    pub fn build(dialect: &dyn Dialect, table: &TableDescriptor) -> Self {
        let columns = table.column_names();
        let col_list = columns
            .iter()
            .map(|c| dialect.quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = table
            .columns
            .iter()
            .enumerate()
            .map(|(i, column)| dialect.column_param(i + 1, column))
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                dialect.qualify(&table.schema, &table.table),
                col_list,
                placeholders
            ),
            columns,
            types: table.column_types(),
        }
    }
}
