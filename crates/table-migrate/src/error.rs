//! Error types for the migration library.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema is not present in the catalog.
    #[error("Invalid schema / schema not found: {0}")]
    SchemaNotFound(String),

    /// Table is not present in the given schema.
    #[error("Invalid table / table not found: {schema}.{table}")]
    TableNotFound { schema: String, table: String },

    /// A column uses a type the engine refuses to move (large objects).
    #[error("Unsupported column type {sql_type} for column {table}.{column}: large objects cannot be migrated")]
    UnsupportedColumnType {
        table: String,
        column: String,
        sql_type: String,
    },

    /// Destination column missing from the source table.
    #[error("Column mismatch: destination columns {missing:?} not found in source {source_table}")]
    ColumnMismatch {
        source_table: String,
        missing: Vec<String>,
    },

    /// Large-table confirmation was declined.
    #[error("Migration cancelled by user")]
    UserCancelled,

    /// Large-table confirmation received neither `y` nor `n`.
    #[error("Invalid confirmation input {0:?}: expected y or n")]
    InvalidConfirmationInput(String),

    /// Failure acquiring a connection from a pool.
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// A batch failed to commit fully.
    #[error("Insert failed for batch {batch}: {message}")]
    InsertFailed { batch: u64, message: String },

    /// Drain was interrupted and outstanding writes were cancelled.
    #[error("Migration interrupted: {0}")]
    Interrupted(String),

    /// Generic wrapper for any other failure surfaced to the caller.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Database driver error
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// IO error (file operations, confirmation prompt)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serializable classification of a failed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Config,
    SchemaNotFound,
    TableNotFound,
    UnsupportedColumnType,
    UserCancelled,
    InvalidConfirmationInput,
    Connection,
    InsertFailed,
    Interrupted,
    MigrationFailed,
}

impl MigrateError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create an InsertFailed error for a batch
    pub fn insert_failed(batch: u64, message: impl Into<String>) -> Self {
        MigrateError::InsertFailed {
            batch,
            message: message.into(),
        }
    }

    /// Classify this error for reporting.
    pub fn kind(&self) -> FailureKind {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => FailureKind::Config,
            MigrateError::SchemaNotFound(_) => FailureKind::SchemaNotFound,
            MigrateError::TableNotFound { .. } => FailureKind::TableNotFound,
            MigrateError::UnsupportedColumnType { .. } => FailureKind::UnsupportedColumnType,
            MigrateError::UserCancelled => FailureKind::UserCancelled,
            MigrateError::InvalidConfirmationInput(_) => FailureKind::InvalidConfirmationInput,
            MigrateError::Connection { .. } => FailureKind::Connection,
            MigrateError::InsertFailed { .. } => FailureKind::InsertFailed,
            MigrateError::Interrupted(_) => FailureKind::Interrupted,
            MigrateError::ColumnMismatch { .. }
            | MigrateError::MigrationFailed(_)
            | MigrateError::Database(_)
            | MigrateError::Io(_)
            | MigrateError::Json(_) => FailureKind::MigrationFailed,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        FailureKind::exit_code(self.kind())
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

impl FailureKind {
    /// Stable process exit code per failure class.
    pub fn exit_code(self) -> u8 {
        match self {
            FailureKind::MigrationFailed => 1,
            FailureKind::Config => 2,
            FailureKind::SchemaNotFound
            | FailureKind::TableNotFound
            | FailureKind::UnsupportedColumnType => 3,
            FailureKind::UserCancelled | FailureKind::InvalidConfirmationInput => 4,
            FailureKind::Connection => 5,
            FailureKind::InsertFailed => 6,
            FailureKind::Interrupted => 130,
        }
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
