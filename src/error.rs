//! Error types for the companion gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the companion gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Model-call collaborator failed or returned an unusable reply
    #[error("model error: {0}")]
    Model(String),

    /// Long-term semantic memory collaborator failed
    #[error("long-term memory error: {0}")]
    LongTermMemory(String),

    /// A collaborator call exceeded its deadline
    #[error("{0} timed out")]
    Timeout(&'static str),

    /// Inbound live-channel frame could not be parsed
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Run a collaborator call under a deadline, mapping expiry to [`Error::Timeout`]
///
/// # Errors
///
/// Returns the call's own error, or `Error::Timeout(label)` when the deadline passes
pub async fn with_deadline<T, F>(label: &'static str, limit: std::time::Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout(label))?
}
