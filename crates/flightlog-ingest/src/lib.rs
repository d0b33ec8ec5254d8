//! Flightlog Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Idempotent ingestion of Lufthansa flight-status data.
//!
//! # Pipeline
//!
//! - **Fetch**: [`api::LufthansaClient`] pages through departures and
//!   [`files::save_raw_batch`] writes the raw batch to disk
//! - **Load**: [`batch::decompose`] splits a raw batch into records and
//!   [`inserter::ingest`] adds the absent ones to a
//!   [`collection::DocumentCollection`]
//! - **Structure**: [`flights`] flattens the stored records and
//!   [`warehouse::upload_rows`] appends the new rows to a relational table
//! - **Provision**: [`provisioning::create_users`] creates database logins
//!
//! # Example
//!
//! ```no_run
//! use flightlog_ingest::collection::MemoryCollection;
//! use flightlog_ingest::inserter::{ingest, IngestOptions};
//! use flightlog_ingest::batch::decompose;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let batch = serde_json::json!({"data": [{"FlightStatusResource": {"Flights": {}}}]});
//!     let collection = MemoryCollection::new("flight_status_resource");
//!
//!     let report = ingest(decompose(&batch)?, &collection, IngestOptions::default()).await?;
//!     assert!(report.is_fully_processed());
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod batch;
pub mod collection;
pub mod config;
pub mod db;
pub mod error;
pub mod files;
pub mod flights;
pub mod inserter;
pub mod postgres;
pub mod provisioning;
pub mod warehouse;

pub use error::{IngestError, Result, StorageError};
pub use inserter::{ingest, CompletionSignal, IngestOptions, IngestReport};
