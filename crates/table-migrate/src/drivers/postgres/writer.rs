//! PostgreSQL target writer.
//!
//! Each [`PgSession`] owns one pooled connection with an open transaction.
//! Rows of a batch are sent as individually executed statements pipelined
//! over that connection, so one bad row yields one failed outcome while the
//! rest of the batch still reports.

use async_trait::async_trait;
use deadpool_postgres::{Object, Pool};
use futures::future::join_all;
use tokio_postgres::types::ToSql;
use tracing::{debug, warn};

use super::{catalog, create_pool, describe_db_error, PostgresDialect};
use crate::config::DatabaseConfig;
use crate::core::{
    CatalogReader, Column, Dialect, InsertStatement, Row, RowOutcome, TableDescriptor,
    TargetWriter, WriteSession,
};
use crate::error::{MigrateError, Result};

/// PostgreSQL target writer implementation.
pub struct PgTarget {
    pool: Pool,
    max_size: usize,
}

impl PgTarget {
    /// Create the destination pool and check that it connects.
    pub async fn connect(config: &DatabaseConfig, max_size: usize) -> Result<Self> {
        let pool = create_pool(config, max_size, "destination").await?;
        Ok(Self::from_pool(pool, max_size))
    }

    /// Wrap an existing pool of `max_size` connections.
    pub fn from_pool(pool: Pool, max_size: usize) -> Self {
        Self { pool, max_size }
    }
}

#[async_trait]
impl CatalogReader for PgTarget {
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
impl TargetWriter for PgTarget {
    fn pool_size(&self) -> usize {
        self.max_size
    }

    async fn begin(&self) -> Result<Box<dyn WriteSession>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::connection(e, "getting destination connection"))?;

        if let Err(e) = client.batch_execute("BEGIN").await {
            drop(Object::take(client));
            return Err(e.into());
        }
        Ok(Box::new(PgSession {
            client: Some(client),
            dialect: PostgresDialect::new(),
        }))
    }
}

/// One open destination transaction.
///
/// Dropping a session whose transaction is still open discards the
/// connection instead of returning it to the pool.
pub struct PgSession {
    client: Option<Object>,
    dialect: PostgresDialect,
}

impl PgSession {
    fn client(&self) -> Result<&Object> {
        self.client
            .as_ref()
            .ok_or_else(|| MigrateError::MigrationFailed("destination transaction already ended".into()))
    }

    /// Run COMMIT or ROLLBACK and release the connection.
    async fn finish(&mut self, sql: &str) -> Result<()> {
        let Some(client) = self.client.take() else {
            return Ok(());
        };
        if let Err(e) = client.batch_execute(sql).await {
            drop(Object::take(client));
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl WriteSession for PgSession {
    async fn clear_table(&mut self, table: &TableDescriptor) -> Result<u64> {
        let sql = format!(
            "DELETE FROM {}",
            self.dialect.qualify(&table.schema, &table.table)
        );
        Ok(self.client()?.execute(sql.as_str(), &[]).await?)
    }

    async fn insert_rows(
        &mut self,
        stmt: &InsertStatement,
        rows: &[Row],
    ) -> Result<Vec<RowOutcome>> {
        let client = self.client()?;
        let prepared = client.prepare_cached(&stmt.sql).await?;
        let prepared = &prepared;

        let pending = rows.iter().map(|row| {
            let params: Vec<&(dyn ToSql + Sync)> =
                row.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
            async move { client.execute(prepared, &params).await }
        });

        let outcomes: Vec<RowOutcome> = join_all(pending)
            .await
            .into_iter()
            .map(|r| match r {
                Ok(n) => RowOutcome::Inserted(n),
                Err(e) => RowOutcome::Failed(describe_db_error(&e)),
            })
            .collect();

        debug!(
            "Executed {} rows ({} failed)",
            outcomes.len(),
            outcomes.iter().filter(|o| o.is_failed()).count()
        );
        Ok(outcomes)
    }

    async fn commit(&mut self) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PgSession {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            warn!("Destination transaction dropped while open; discarding its connection");
            drop(Object::take(client));
        }
    }
}
