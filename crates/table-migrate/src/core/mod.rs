//! Core abstractions shared by the engine and the drivers.
//!
//! - [`schema`]: table descriptors, columns and portable SQL types
//! - [`value`]: SQL values, rows and batches
//! - [`traits`]: boundary traits implemented by database drivers
//!
//! The engine modules (`validator`, `source`, `target`, `transfer`) depend
//! only on this module, never on a concrete driver.

pub mod schema;
pub mod traits;
pub mod value;

// Re-export commonly used types for convenience
pub use schema::{Column, SqlType, TableDescriptor};
pub use traits::{
    CatalogReader, Dialect, InsertStatement, RowCursor, RowOutcome, SourceReader, TargetWriter,
    WriteSession,
};
pub use value::{Batch, Row, SqlNullType, SqlValue};
