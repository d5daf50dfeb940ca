//! # table-migrate
//!
//! Streaming single-table copy between two PostgreSQL databases.
//!
//! This library provides:
//!
//! - **Validation** of schema, table and column types before any row is read
//! - **Streaming extraction** through a server-side cursor, cut into batches
//! - **Sequential or concurrent loading**, one transaction per batch
//! - **Large-table confirmation** before copying more than a million rows
//! - **Append or replace** semantics for the destination table
//!
//! ## Example
//!
//! ```rust,no_run
//! use table_migrate::{Config, ExecutionMode, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> table_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::connect(&config).await?;
//!     let result = orchestrator
//!         .run(ExecutionMode::Sequential, CancellationToken::new())
//!         .await;
//!     println!("Migrated {} rows", result.rows_migrated);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod confirm;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod progress;
pub mod source;
pub mod target;
pub mod transfer;
pub mod validator;

// Re-exports for convenient access
pub use config::{Config, DatabaseConfig, MigrationConfig};
pub use confirm::{AutoConfirm, ConfirmationGate, PromptConfirmation, LARGE_TABLE_THRESHOLD};
pub use error::{FailureKind, MigrateError, Result};
pub use orchestrator::{
    ExecutionMode, Failure, HealthCheckResult, MigrationOptions, MigrationResult, Orchestrator,
    ValidationReport,
};
pub use progress::{JsonProgress, LogProgress, NoProgress, ProgressSink};
pub use source::{BatchAccumulator, BatchReader};
pub use target::BatchWriter;
pub use transfer::{DrainPolicy, WritePool, WriteReport};
pub use validator::SchemaValidator;
