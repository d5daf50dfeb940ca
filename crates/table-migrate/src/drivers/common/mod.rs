//! Utilities shared by the driver pools.

pub mod tls;

pub use tls::{SslMode, TlsBuilder};
