//! SQL dialect layer
//!
//! One trait, two engines. The trait (`Dialect`) is a closed catalog of
//! syntax-emission primitives plus an execution surface; the translator
//! owns every semantic decision and calls down here for tokens only.
//!
//! - `DuckDbDialect`: analytical JSON-native engine, single in-process
//!   connection.
//! - `PostgresDialect`: transactional engine with native JSONB, pooled
//!   connections, retry with exponential backoff for connection-class
//!   failures.

pub mod dialect;
pub mod error;
pub mod retry;

#[cfg(feature = "duckdb")]
mod duckdb;
#[cfg(feature = "postgres")]
pub mod pool;
#[cfg(feature = "postgres")]
mod postgres;

pub use dialect::{
    escape_string, BoundaryKind, Capabilities, CaseKind, CastType, Dialect, DialectKind, Encoding,
    EscapeTarget, JsonTypeFamily, MathFunction, Row, TemporalUnit, TemporalValueKind,
    EXTENSION_VALUE_FIELDS,
};
pub use error::{DialectError, Result};
pub use retry::RetryPolicy;

#[cfg(feature = "duckdb")]
pub use crate::duckdb::DuckDbDialect;
#[cfg(feature = "postgres")]
pub use crate::pool::{ClientPool, PoolConfig, PooledClient};
#[cfg(feature = "postgres")]
pub use crate::postgres::PostgresDialect;

/// Explicit dialect construction parameters. No connection-string
/// sniffing: the caller states the engine.
#[derive(Debug, Clone)]
pub enum DialectConfig {
    /// DuckDB; `None` opens an in-memory database.
    #[cfg(feature = "duckdb")]
    DuckDb { path: Option<String> },

    /// PostgreSQL with pool settings.
    #[cfg(feature = "postgres")]
    Postgres(pool::PoolConfig),
}

impl DialectConfig {
    /// Build the dialect handle.
    pub fn connect(self) -> Result<Box<dyn Dialect>> {
        match self {
            #[cfg(feature = "duckdb")]
            DialectConfig::DuckDb { path } => {
                let dialect = match path {
                    Some(path) => DuckDbDialect::open(&path)?,
                    None => DuckDbDialect::in_memory()?,
                };
                Ok(Box::new(dialect))
            }
            #[cfg(feature = "postgres")]
            DialectConfig::Postgres(config) => Ok(Box::new(PostgresDialect::connect(config))),
        }
    }
}
