//! Translation errors

use basalt_dialect::DialectError;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, TranslationError>;

/// Errors raised while turning a typed AST into SQL. Each carries the
/// source slice of the offending node so callers can point back into the
/// original expression.
#[derive(Error, Debug, Clone)]
pub enum TranslationError {
    #[error("unknown function '{name}' in '{source_text}'")]
    UnknownFunction { name: String, source_text: String },

    #[error("{name}() expects {expected} argument(s), found {found} in '{source_text}'")]
    WrongArity {
        name: String,
        expected: String,
        found: usize,
        source_text: String,
    },

    #[error("operator '{operator}' is not supported for {operand} in '{source_text}'")]
    UnsupportedOperator {
        operator: String,
        operand: String,
        source_text: String,
    },

    #[error("unsupported construct in '{source_text}': {message}")]
    Unsupported {
        message: String,
        source_text: String,
    },

    #[error(transparent)]
    Dialect(#[from] DialectError),
}

impl TranslationError {
    /// Source slice of the node the error points at, when known.
    pub fn source_text(&self) -> Option<&str> {
        match self {
            TranslationError::UnknownFunction { source_text, .. }
            | TranslationError::WrongArity { source_text, .. }
            | TranslationError::UnsupportedOperator { source_text, .. }
            | TranslationError::Unsupported { source_text, .. } => Some(source_text),
            TranslationError::Dialect(_) => None,
        }
    }
}
