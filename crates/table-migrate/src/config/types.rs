//! Configuration type definitions.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Default PostgreSQL port.
pub const DEFAULT_PORT: u16 = 5432;

/// Default source pool size.
pub const DEFAULT_SOURCE_MAX_CONNECTIONS: usize = 4;

/// Default destination pool size, which is also the writer concurrency.
pub const DEFAULT_DESTINATION_MAX_CONNECTIONS: usize = 8;

/// Default rows per batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default drain wait window in seconds.
pub const DEFAULT_DRAIN_WINDOW_SECS: u64 = 60;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Table rows are read from.
    pub source: DatabaseConfig,

    /// Table rows are written to.
    pub destination: DatabaseConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

impl Config {
    /// Source pool size.
    pub fn source_pool_size(&self) -> usize {
        self.source
            .max_connections
            .unwrap_or(DEFAULT_SOURCE_MAX_CONNECTIONS)
    }

    /// Destination pool size.
    pub fn destination_pool_size(&self) -> usize {
        self.destination
            .max_connections
            .unwrap_or(DEFAULT_DESTINATION_MAX_CONNECTIONS)
    }
}

/// One side of the migration: a PostgreSQL table and how to reach it.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Schema containing the table (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// Table name.
    pub table: String,

    /// SSL mode (default: "disable").
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,

    /// Maximum pool size. Defaults differ per side, see [`Config`].
    #[serde(default)]
    pub max_connections: Option<usize>,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("table", &self.table)
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per batch, also the cursor fetch size.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Write batches concurrently on the destination pool.
    #[serde(default)]
    pub multithreaded: bool,

    /// Keep existing destination rows instead of clearing the table first.
    #[serde(default)]
    pub append: bool,

    /// Ask before migrating tables above the large-table threshold.
    #[serde(default = "default_true")]
    pub large_table_confirmation: bool,

    /// Run the clear and every batch in one destination transaction.
    /// Only honoured in sequential mode.
    #[serde(default)]
    pub single_transaction: bool,

    /// Length of one drain wait window.
    #[serde(default = "default_drain_window_secs")]
    pub drain_window_secs: u64,

    /// Number of drain windows to wait before cancelling outstanding writes.
    /// Unset means wait indefinitely.
    #[serde(default)]
    pub drain_patience: Option<u32>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            multithreaded: false,
            append: false,
            large_table_confirmation: true,
            single_transaction: false,
            drain_window_secs: DEFAULT_DRAIN_WINDOW_SECS,
            drain_patience: None,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_ssl_mode() -> String {
    "disable".to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_true() -> bool {
    true
}

fn default_drain_window_secs() -> u64 {
    DEFAULT_DRAIN_WINDOW_SECS
}
