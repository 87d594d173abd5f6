//! Error types for the error catalog.
//!
//! Every variant carries owned strings so a single refresh outcome can be
//! cloned out to all callers awaiting it.

use std::time::Duration;

/// Catalog errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CatalogError {
    /// The catalog endpoint answered with a non-2xx status.
    #[error("catalog endpoint returned HTTP {status}")]
    Status { status: u16 },

    /// The request did not complete before the timeout and was aborted.
    #[error("catalog request timed out after {after:?}")]
    Timeout { after: Duration },

    /// Transport-level failure (connect, TLS, body read).
    #[error("network error: {message}")]
    Network { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// The background refresh task died before producing a result.
    #[error("refresh failed: {message}")]
    Refresh { message: String },
}

impl CatalogError {
    /// Exit code for CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. } => 1,

            // Network/transient
            Self::Status { .. } => 5,
            Self::Timeout { .. } => 5,
            Self::Network { .. } => 5,

            Self::Refresh { .. } => 6,
        }
    }

    /// Whether a later `init_catalog` call may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { status } => *status >= 500 || *status == 429,
            Self::Timeout { .. } | Self::Network { .. } | Self::Refresh { .. } => true,
            Self::Config { .. } => false,
        }
    }
}

impl From<reqwest::Error> for CatalogError {
    fn from(err: reqwest::Error) -> Self {
        Self::Network {
            message: err.to_string(),
        }
    }
}

/// Durable store errors.
///
/// These never reach resolver callers; the cache logs them and falls back to
/// the network.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// SQLite reported an error.
    #[error("database error: {0}")]
    Database(String),

    /// The value could not be serialized for storage.
    #[error("failed to encode {key}: {message}")]
    Encode { key: String, message: String },

    /// The stored value could not be decoded into the requested type.
    #[error("failed to decode {key}: {message}")]
    Decode { key: String, message: String },

    /// The database was written by a newer schema.
    #[error("unsupported store schema version {found} (supported: {supported})")]
    Version { found: i64, supported: i64 },

    /// Filesystem error while preparing the database location.
    #[error("store io error: {message}")]
    Io { message: String },

    /// The blocking worker running the query panicked or was cancelled.
    #[error("store task failed: {message}")]
    Task { message: String },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
