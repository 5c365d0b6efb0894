//! Dialect-layer errors

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, DialectError>;

/// Errors raised by the dialect layer: emission gaps, connection
/// lifecycle, and SQL execution. Only connection-class errors are
/// retryable; query and data errors never are.
#[derive(Error, Debug, Clone)]
pub enum DialectError {
    #[error("{dialect} does not implement primitive '{primitive}'")]
    NotImplemented {
        dialect: &'static str,
        primitive: &'static str,
    },

    #[error("connection pool exhausted after waiting {waited_ms}ms")]
    PoolExhausted { waited_ms: u64 },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("execution error: {0}")]
    Execution(String),
}

impl DialectError {
    /// Whether a retry with backoff may help. Execution errors are
    /// deterministic and excluded.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DialectError::Connection(_) | DialectError::PoolExhausted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability() {
        assert!(DialectError::Connection("broken pipe".into()).is_retryable());
        assert!(DialectError::PoolExhausted { waited_ms: 100 }.is_retryable());
        assert!(!DialectError::Execution("division by zero".into()).is_retryable());
        assert!(!DialectError::NotImplemented {
            dialect: "duckdb",
            primitive: "x"
        }
        .is_retryable());
    }
}
