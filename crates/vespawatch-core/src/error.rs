//! Error types for vespawatch-core

use thiserror::Error;

/// Result type alias using vespawatch-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in vespawatch-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No local taxon is registered for a remote taxon id. Callers decide the
    /// fallback policy (retry, skip, or store the raw remote species name).
    #[error("No local taxon registered for remote taxon id {0}")]
    TaxonMatch(i64),

    /// The remote payload's observation time could not be parsed
    #[error("Cannot parse observation date: {0}")]
    ParseDate(String),

    /// Remote platform returned a failure response
    #[error("Remote platform error: {0}")]
    Remote(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
