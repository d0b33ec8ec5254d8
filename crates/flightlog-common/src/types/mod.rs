//! Common types used across Flightlog

use crate::error::{FlightlogError, Result};

/// Maximum identifier length accepted by PostgreSQL (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// A flight-status document as received from the airline API.
///
/// Documents are opaque JSON objects. Two documents are considered the same
/// record when every field matches; `serde_json::Map` equality ignores key
/// order, which mirrors how the document store compares stored entries.
///
/// # Examples
///
/// ```rust
/// use flightlog_common::types::Document;
/// use serde_json::json;
///
/// let a: Document = serde_json::from_value(json!({"Flight": "LH400", "Gate": "A26"})).unwrap();
/// let b: Document = serde_json::from_value(json!({"Gate": "A26", "Flight": "LH400"})).unwrap();
/// assert_eq!(a, b);
/// ```
pub type Document = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// SQL Identifiers
// ============================================================================

/// Validate a collection, table, column or role name before it is spliced
/// into SQL.
///
/// # Rules
/// - Must not be empty
/// - Must not exceed [`MAX_IDENTIFIER_LENGTH`] bytes
/// - Must start with an ASCII letter or underscore
/// - Must contain only ASCII letters, digits and underscores
///
/// Upper-case letters are allowed; identifiers are always emitted quoted, so
/// `Departure_AirportCode` keeps its case.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(FlightlogError::invalid_identifier(name, "must not be empty"));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(FlightlogError::invalid_identifier(
            name,
            format!("must be at most {} characters", MAX_IDENTIFIER_LENGTH),
        ));
    }

    let mut chars = name.chars();
    if let Some(first) = chars.next() {
        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(FlightlogError::invalid_identifier(
                name,
                "must start with a letter or underscore",
            ));
        }
    }

    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(FlightlogError::invalid_identifier(
            name,
            "can only contain letters, numbers, and underscores",
        ));
    }

    Ok(())
}

/// Validate `name` and return it double-quoted for use in SQL text.
pub fn quote_identifier(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name))
}
