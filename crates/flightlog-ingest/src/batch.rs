//! Batch decomposition
//!
//! A raw batch, as saved from the departures endpoint, looks like:
//!
//! ```json
//! {"data": [{"FlightStatusResource": {...}}, {"FlightStatusResource": {...}}]}
//! ```
//!
//! [`decompose`] turns it into the ordered list of flight-status documents
//! that the inserter consumes.

use flightlog_common::Document;
use serde_json::Value;

use crate::error::{IngestError, Result};

/// Top-level key holding the wrapper list.
pub const DATA_KEY: &str = "data";

/// Key under which each wrapper carries its record.
pub const RECORD_KEY: &str = "FlightStatusResource";

/// Extract the flight-status records of `batch`, in source order.
///
/// # Errors
///
/// Returns [`IngestError::MalformedBatch`] when `data` is missing or not an
/// array, or when any entry is not an object carrying an object under
/// `FlightStatusResource`. No partial result is returned.
pub fn decompose(batch: &Value) -> Result<Vec<Document>> {
    let entries = batch
        .get(DATA_KEY)
        .ok_or_else(|| IngestError::malformed(format!("missing top-level '{}' key", DATA_KEY)))?
        .as_array()
        .ok_or_else(|| IngestError::malformed(format!("'{}' is not an array", DATA_KEY)))?;

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let record = entry.get(RECORD_KEY).ok_or_else(|| {
                IngestError::malformed(format!(
                    "entry {} has no '{}' key",
                    index, RECORD_KEY
                ))
            })?;

            record.as_object().cloned().ok_or_else(|| {
                IngestError::malformed(format!(
                    "entry {}: '{}' is not an object",
                    index, RECORD_KEY
                ))
            })
        })
        .collect()
}
