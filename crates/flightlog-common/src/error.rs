//! Error types for Flightlog

use thiserror::Error;

/// Result type alias for Flightlog operations
pub type Result<T> = std::result::Result<T, FlightlogError>;

/// Main error type shared across the workspace
#[derive(Error, Debug)]
pub enum FlightlogError {
    #[error("Invalid identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: String },
}

impl FlightlogError {
    /// Create an invalid identifier error
    pub fn invalid_identifier(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
