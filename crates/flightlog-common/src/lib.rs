//! Flightlog Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the Flightlog workspace.
//!
//! # Overview
//!
//! - **Error Handling**: the workspace-wide [`FlightlogError`] and [`Result`] alias
//! - **Logging**: `tracing` subscriber setup shared by every binary
//! - **Types**: the flight-status [`Document`](types::Document) shape and SQL
//!   identifier helpers
//!
//! # Example
//!
//! ```no_run
//! use flightlog_common::{Result, types::validate_identifier};
//!
//! fn pick_collection(name: &str) -> Result<()> {
//!     validate_identifier(name)?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{FlightlogError, Result};
pub use types::Document;
