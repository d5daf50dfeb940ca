//! PostgreSQL driver.
//!
//! This module provides PostgreSQL-specific implementations:
//!
//! - [`PostgresDialect`]: SQL syntax strategy for PostgreSQL
//! - [`PgSource`]: catalog lookups, row count and server-side cursor
//! - [`PgTarget`]: catalog lookups and transactional write sessions

mod catalog;
mod dialect;
mod reader;
mod value;
mod writer;

pub use dialect::PostgresDialect;
pub use reader::{PgCursor, PgSource};
pub use value::decode_row;
pub use writer::{PgSession, PgTarget};

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::Config as PgConfig;
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::drivers::common::TlsBuilder;
use crate::error::{MigrateError, Result};

/// Create a connection pool for one side of the migration and test it.
///
/// `role` ("source" or "destination") only labels log lines and errors.
pub(crate) async fn create_pool(
    config: &DatabaseConfig,
    max_size: usize,
    role: &str,
) -> Result<Pool> {
    let mut pg_config = PgConfig::new();
    pg_config.host(&config.host);
    pg_config.port(config.port);
    pg_config.dbname(&config.database);
    pg_config.user(&config.user);
    pg_config.password(&config.password);
    pg_config.application_name("table-migrate");

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };

    let pool = match TlsBuilder::parse(&config.ssl_mode)?.build()? {
        None => {
            warn!(
                "PostgreSQL {} TLS is disabled. Credentials will be transmitted in plaintext.",
                role
            );
            let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
            Pool::builder(mgr).max_size(max_size).build()
        }
        Some(tls) => {
            let mgr = Manager::from_config(pg_config, tls, mgr_config);
            Pool::builder(mgr).max_size(max_size).build()
        }
    }
    .map_err(|e| MigrateError::connection(e, format!("creating PostgreSQL {role} pool")))?;

    // Test connection
    let client = pool
        .get()
        .await
        .map_err(|e| MigrateError::connection(e, format!("testing PostgreSQL {role} connection")))?;
    client.simple_query("SELECT 1").await?;

    info!(
        "Connected to PostgreSQL {}: {}:{}/{} (pool size {})",
        role, config.host, config.port, config.database, max_size
    );

    Ok(pool)
}

/// Server message of a database error, with detail when present.
pub(crate) fn describe_db_error(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => match db.detail() {
            Some(detail) => format!("{} ({}): {}", db.message(), db.code().code(), detail),
            None => format!("{} ({})", db.message(), db.code().code()),
        },
        None => e.to_string(),
    }
}
