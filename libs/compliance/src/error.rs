//! Compliance harness errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ComplianceError {
    #[error("corpus XML parse error: {0}")]
    CorpusXml(roxmltree::Error),

    #[error("corpus format error: {0}")]
    Corpus(String),

    #[error("fixture error: {0}")]
    Fixture(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Dialect(#[from] basalt_dialect::DialectError),
}
