//! Database driver implementations.
//!
//! - [`postgres`]: PostgreSQL source and destination
//! - [`common`]: TLS configuration shared by both pools
//!
//! A driver implements the boundary traits in [`crate::core::traits`]:
//! `SourceReader` and `RowCursor` for extraction, `TargetWriter` and
//! `WriteSession` for loading, and `Dialect` for SQL syntax.

pub mod common;
pub mod postgres;

pub use common::{SslMode, TlsBuilder};
pub use postgres::{PgSource, PgTarget, PostgresDialect};
