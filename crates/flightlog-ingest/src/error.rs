//! Error types for flight ingestion
//!
//! Two failure classes matter to callers of the core: a batch that does not
//! have the expected shape ([`IngestError::MalformedBatch`]) and a collection
//! that could not be probed or written ([`StorageError`]). An already-ingested
//! batch is never an error; it is reported through
//! [`CompletionSignal`](crate::inserter::CompletionSignal).

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Result type alias for collection operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Failures raised by a [`DocumentCollection`](crate::collection::DocumentCollection).
#[derive(Debug, Error)]
pub enum StorageError {
    /// Existence probe failed
    #[error("find_one on collection '{collection}' failed: {message}")]
    Probe { collection: String, message: String },

    /// Insert failed
    #[error("insert_one on collection '{collection}' failed: {message}")]
    Insert { collection: String, message: String },

    /// Collection could not be created or opened
    #[error("collection '{collection}' is unavailable: {message}")]
    Unavailable { collection: String, message: String },
}

impl StorageError {
    pub fn probe(collection: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Probe {
            collection: collection.into(),
            message: err.to_string(),
        }
    }

    pub fn insert(collection: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Insert {
            collection: collection.into(),
            message: err.to_string(),
        }
    }

    pub fn unavailable(collection: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            collection: collection.into(),
            message: err.to_string(),
        }
    }
}

/// Main error type for the ingest crate
#[derive(Debug, Error)]
pub enum IngestError {
    /// The batch does not have the `data[*].FlightStatusResource` shape
    #[error("Malformed batch: {0}")]
    MalformedBatch(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Airline API answered with an unexpected status or payload
    #[error("Airline API error: {0}")]
    Api(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Common(#[from] flightlog_common::FlightlogError),
}

impl IngestError {
    /// Create a malformed batch error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedBatch(msg.into())
    }

    /// Create an API error
    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}
