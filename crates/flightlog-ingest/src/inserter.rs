//! Idempotent insertion of flight-status records
//!
//! Every record is probed against the collection and inserted only when no
//! structurally equal document exists. Re-running a batch therefore never
//! duplicates a record.
//!
//! Probing a whole batch that was ingested on a previous run is wasted work,
//! so the inserter also counts records it finds already present. Once that
//! count reaches [`IngestOptions::existence_threshold`], the next present
//! record ends the pass and the batch is reported as
//! [`CompletionSignal::AbandonedEarly`]. `force_full_scan` turns the shortcut
//! off.
//!
//! The shortcut is an approximation: a batch whose leading records were
//! ingested by an interrupted run, but whose tail is new, is abandoned
//! before the tail is reached. Verification runs should force a full scan.

use flightlog_common::Document;
use tracing::info;

use crate::collection::DocumentCollection;
use crate::error::StorageResult;

/// Already-present records tolerated before a batch is assumed ingested.
pub const DEFAULT_EXISTENCE_THRESHOLD: usize = 5;

/// Tuning for a single [`ingest`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Number of already-present records tolerated before early exit
    pub existence_threshold: usize,
    /// Probe every record regardless of how many are already present
    pub force_full_scan: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            existence_threshold: DEFAULT_EXISTENCE_THRESHOLD,
            force_full_scan: false,
        }
    }
}

impl IngestOptions {
    pub fn with_threshold(mut self, existence_threshold: usize) -> Self {
        self.existence_threshold = existence_threshold;
        self
    }

    pub fn with_force_full_scan(mut self, force_full_scan: bool) -> Self {
        self.force_full_scan = force_full_scan;
        self
    }

    fn threshold_reached(&self, already_present: usize) -> bool {
        already_present >= self.existence_threshold && !self.force_full_scan
    }
}

/// Whether a batch was processed to the end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionSignal {
    /// Every examined record was inserted or tolerated as already present
    FullyProcessed,
    /// Enough records were already present that the batch is assumed ingested
    AbandonedEarly,
}

impl CompletionSignal {
    pub fn is_fully_processed(self) -> bool {
        matches!(self, CompletionSignal::FullyProcessed)
    }
}

impl From<CompletionSignal> for bool {
    fn from(signal: CompletionSignal) -> Self {
        signal.is_fully_processed()
    }
}

/// Outcome of one [`ingest`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    pub signal: CompletionSignal,
    /// Records probed, including the one that triggered an early exit
    pub examined: usize,
    /// Records newly inserted
    pub inserted: usize,
    /// Records found already present and tolerated
    pub already_present: usize,
}

impl IngestReport {
    pub fn is_fully_processed(&self) -> bool {
        self.signal.is_fully_processed()
    }
}

/// Insert the absent `records` into `collection`, in order.
///
/// # Errors
///
/// Returns the first [`StorageError`](crate::error::StorageError) raised by a
/// probe or insert. Records inserted before the failure stay in the
/// collection; a later run skips them through the existence probe.
#[tracing::instrument(
    skip(records, collection),
    fields(
        collection = %collection.name(),
        existence_threshold = options.existence_threshold,
        force_full_scan = options.force_full_scan
    )
)]
pub async fn ingest<C, I>(
    records: I,
    collection: &C,
    options: IngestOptions,
) -> StorageResult<IngestReport>
where
    C: DocumentCollection + ?Sized,
    I: IntoIterator<Item = Document>,
{
    let mut examined = 0;
    let mut inserted = 0;
    let mut already_present = 0;

    for record in records {
        examined += 1;

        if collection.find_one(&record).await?.is_none() {
            collection.insert_one(&record).await?;
            inserted += 1;
            continue;
        }

        if options.threshold_reached(already_present) {
            break;
        }
        already_present += 1;
    }

    let signal = if options.threshold_reached(already_present) {
        CompletionSignal::AbandonedEarly
    } else {
        CompletionSignal::FullyProcessed
    };

    let report = IngestReport {
        signal,
        examined,
        inserted,
        already_present,
    };

    match signal {
        CompletionSignal::FullyProcessed => info!(
            collection = %collection.name(),
            examined,
            inserted,
            already_present,
            fully_processed = true,
            "Batch documents added to collection"
        ),
        CompletionSignal::AbandonedEarly => info!(
            collection = %collection.name(),
            examined,
            inserted,
            already_present,
            fully_processed = false,
            "At least {} documents of the batch already exist in collection",
            options.existence_threshold
        ),
    }

    Ok(report)
}
