//! Raw departure files
//!
//! The fetch step writes one `dep_flights_<IATA>_<timestamp>.json` file per
//! run. Loading walks those files in name order, which is also fetch order,
//! and feeds each one through [`decompose`] and [`ingest`]. Files whose name
//! contains `OLD` are archived copies and are skipped.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::batch::decompose;
use crate::collection::DocumentCollection;
use crate::error::{IngestError, Result};
use crate::inserter::{ingest, IngestOptions, IngestReport};

/// Marker every raw departure file name contains.
pub const FILE_MARKER: &str = "dep_flights";

/// Marker of archived files that must not be loaded again.
pub const ARCHIVE_MARKER: &str = "OLD";

/// Ingestion result for one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub report: IngestReport,
}

fn is_flight_file(name: &str) -> bool {
    name.contains(FILE_MARKER) && !name.contains(ARCHIVE_MARKER)
}

/// Raw departure files in `dir`, sorted by file name.
pub fn discover_flight_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir).map_err(|e| IngestError::io(dir, e))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| IngestError::io(dir, e))?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let selected = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(is_flight_file);
        if selected {
            files.push(path);
        }
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Read and parse one batch file.
pub fn load_batch(path: &Path) -> Result<Value> {
    let content = std::fs::read_to_string(path).map_err(|e| IngestError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| IngestError::json(path, e))
}

/// Load, decompose and ingest one file.
#[tracing::instrument(skip(collection), fields(collection = %collection.name()))]
pub async fn ingest_flight_file<C>(
    path: &Path,
    collection: &C,
    options: IngestOptions,
) -> Result<IngestReport>
where
    C: DocumentCollection + ?Sized,
{
    info!(path = %path.display(), "Adding flight file to collection");

    let batch = load_batch(path)?;
    let records = decompose(&batch)?;
    let report = ingest(records, collection, options).await?;

    if !report.is_fully_processed() {
        warn!(
            path = %path.display(),
            already_present = report.already_present,
            "File appears to be already ingested"
        );
    }

    Ok(report)
}

/// Ingest every raw departure file in `dir`, in name order.
///
/// The first error aborts the run. Files already processed keep their
/// inserts.
#[tracing::instrument(skip(collection), fields(collection = %collection.name()))]
pub async fn ingest_flight_files<C>(
    dir: &Path,
    collection: &C,
    options: IngestOptions,
) -> Result<Vec<FileReport>>
where
    C: DocumentCollection + ?Sized,
{
    let files = discover_flight_files(dir)?;
    info!(count = files.len(), dir = %dir.display(), "Discovered flight files");

    let mut reports = Vec::with_capacity(files.len());
    for path in files {
        let report = ingest_flight_file(&path, collection, options).await?;
        reports.push(FileReport { path, report });
    }

    let inserted: usize = reports.iter().map(|r| r.report.inserted).sum();
    info!(files = reports.len(), inserted, "Flight files ingested");

    Ok(reports)
}

/// File name for a batch of `airport` departures fetched at `at`.
pub fn raw_file_name(airport: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}.json",
        FILE_MARKER,
        airport.to_uppercase(),
        at.format("%Y%m%d_%H%M%S")
    )
}

/// Write `batch` as pretty JSON into `dir` and return the file path.
pub fn save_raw_batch(dir: &Path, airport: &str, batch: &Value, at: DateTime<Utc>) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| IngestError::io(dir, e))?;

    let path = dir.join(raw_file_name(airport, at));
    let content = serde_json::to_string_pretty(batch).map_err(|e| IngestError::json(&path, e))?;
    std::fs::write(&path, content).map_err(|e| IngestError::io(&path, e))?;

    info!(path = %path.display(), "Raw batch saved");
    Ok(path)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::collection::MemoryCollection;
    use crate::inserter::CompletionSignal;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    fn batch(numbers: &[&str]) -> Value {
        let data: Vec<Value> = numbers
            .iter()
            .map(|n| {
                json!({"FlightStatusResource": {
                    "Flights": {"Flight": {"MarketingCarrier": {"AirlineID": "LH", "FlightNumber": n}}}
                }})
            })
            .collect();
        json!({ "data": data })
    }

    fn write(dir: &Path, name: &str, value: &Value) {
        std::fs::write(dir.join(name), value.to_string()).unwrap();
    }

    #[test]
    fn test_discover_filters_and_sorts() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "dep_flights_FRA_20240102_080000.json", &batch(&[]));
        write(dir.path(), "dep_flights_FRA_20240101_080000.json", &batch(&[]));
        write(dir.path(), "dep_flights_FRA_OLD.json", &batch(&[]));
        write(dir.path(), "arrivals.json", &batch(&[]));
        std::fs::create_dir(dir.path().join("dep_flights_dir")).unwrap();

        let files = discover_flight_files(dir.path()).unwrap();

        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "dep_flights_FRA_20240101_080000.json",
                "dep_flights_FRA_20240102_080000.json"
            ]
        );
    }

    #[test]
    fn test_discover_missing_dir_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = discover_flight_files(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, IngestError::Io { .. }));
    }

    #[test]
    fn test_load_batch_invalid_json_names_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dep_flights_bad.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = load_batch(&path).unwrap_err();

        assert!(matches!(err, IngestError::Json { .. }));
        assert!(err.to_string().contains("dep_flights_bad.json"));
    }

    #[tokio::test]
    async fn test_ingest_flight_files_in_order() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "dep_flights_FRA_2.json", &batch(&["3", "1"]));
        write(dir.path(), "dep_flights_FRA_1.json", &batch(&["1", "2"]));
        let collection = MemoryCollection::new("flights");

        let reports = ingest_flight_files(dir.path(), &collection, IngestOptions::default())
            .await
            .unwrap();

        assert_eq!(reports.len(), 2);
        assert!(reports[0].path.ends_with("dep_flights_FRA_1.json"));
        assert_eq!(reports[0].report.inserted, 2);
        assert_eq!(reports[1].report.inserted, 1);
        assert_eq!(reports[1].report.already_present, 1);
        assert_eq!(collection.len().await, 3);
    }

    #[tokio::test]
    async fn test_reloading_directory_inserts_nothing() {
        let dir = TempDir::new().unwrap();
        let numbers: Vec<String> = (0..10).map(|n| n.to_string()).collect();
        let refs: Vec<&str> = numbers.iter().map(String::as_str).collect();
        write(dir.path(), "dep_flights_FRA_1.json", &batch(&refs));
        let collection = MemoryCollection::new("flights");

        ingest_flight_files(dir.path(), &collection, IngestOptions::default())
            .await
            .unwrap();
        let second = ingest_flight_files(dir.path(), &collection, IngestOptions::default())
            .await
            .unwrap();

        assert_eq!(second[0].report.inserted, 0);
        assert_eq!(second[0].report.signal, CompletionSignal::AbandonedEarly);
        assert_eq!(collection.len().await, 10);
    }

    #[tokio::test]
    async fn test_malformed_file_aborts_run() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "dep_flights_FRA_1.json", &batch(&["1"]));
        write(dir.path(), "dep_flights_FRA_2.json", &json!({"flights": []}));
        write(dir.path(), "dep_flights_FRA_3.json", &batch(&["3"]));
        let collection = MemoryCollection::new("flights");

        let err = ingest_flight_files(dir.path(), &collection, IngestOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::MalformedBatch(_)));
        assert_eq!(collection.len().await, 1);
    }

    #[test]
    fn test_save_raw_batch() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("1_raw");
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap();

        let path = save_raw_batch(&target, "fra", &batch(&["400"]), at).unwrap();

        assert!(path.ends_with("dep_flights_FRA_20240305_070809.json"));
        assert_eq!(load_batch(&path).unwrap(), batch(&["400"]));
        assert_eq!(discover_flight_files(&target).unwrap(), vec![path]);
    }
}
