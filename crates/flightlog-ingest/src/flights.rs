//! Flight structuring for the warehouse
//!
//! A flight-status record holds one or more flights under `Flights.Flight`
//! (a single object when there is one flight, an array otherwise). Each
//! flight is flattened into `Parent_Child` text columns and then projected
//! onto the warehouse column set.

use flightlog_common::Document;
use serde_json::Value;
use std::collections::BTreeMap;

/// Warehouse columns kept for every flight.
pub const FLIGHT_COLUMNS: &[&str] = &[
    "Departure_AirportCode",
    "Departure_ScheduledTimeUTC_DateTime",
    "Arrival_AirportCode",
    "Arrival_ScheduledTimeUTC_DateTime",
    "Arrival_ActualTimeUTC_DateTime",
];

/// Separator between nested key names in a flattened column.
pub const COLUMN_SEPARATOR: &str = "_";

/// One flattened flight: column name to text value, `None` for JSON null.
pub type FlatRow = BTreeMap<String, Option<String>>;

/// The flights carried by one flight-status record.
pub fn flights_in(resource: &Document) -> Vec<&Value> {
    match resource.get("Flights").and_then(|f| f.get("Flight")) {
        Some(Value::Array(flights)) => flights.iter().collect(),
        Some(flight @ Value::Object(_)) => vec![flight],
        _ => Vec::new(),
    }
}

/// Every flight object of `resources`, in order.
pub fn extract_flights(resources: &[Document]) -> Vec<Document> {
    resources
        .iter()
        .flat_map(flights_in)
        .filter_map(|flight| flight.as_object().cloned())
        .collect()
}

/// Flatten nested objects into `Parent_Child` columns.
pub fn flatten_document(document: &Document) -> FlatRow {
    let mut row = FlatRow::new();
    flatten_into(&mut row, None, document);
    row
}

fn flatten_into(row: &mut FlatRow, prefix: Option<&str>, object: &Document) {
    for (key, value) in object {
        let column = match prefix {
            Some(prefix) => format!("{}{}{}", prefix, COLUMN_SEPARATOR, key),
            None => key.clone(),
        };

        match value {
            Value::Object(nested) => flatten_into(row, Some(&column), nested),
            Value::Null => {
                row.insert(column, None);
            }
            Value::String(s) => {
                row.insert(column, Some(s.clone()));
            }
            Value::Array(_) | Value::Bool(_) | Value::Number(_) => {
                row.insert(column, Some(value.to_string()));
            }
        }
    }
}

/// A rectangular set of text rows
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RowBatch {
    /// Project flattened rows onto `columns`. Missing columns are NULL.
    pub fn project(flattened: &[FlatRow], columns: &[&str]) -> Self {
        let rows = flattened
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|column| row.get(*column).cloned().flatten())
                    .collect()
            })
            .collect();

        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Flights of `resources` projected onto [`FLIGHT_COLUMNS`].
pub fn structure_flights(resources: &[Document]) -> RowBatch {
    let flattened: Vec<FlatRow> = extract_flights(resources)
        .iter()
        .map(flatten_document)
        .collect();
    RowBatch::project(&flattened, FLIGHT_COLUMNS)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        serde_json::from_value(value).unwrap()
    }

    fn flight(from: &str, to: &str) -> Value {
        json!({
            "Departure": {
                "AirportCode": from,
                "ScheduledTimeUTC": {"DateTime": "2024-03-05T07:00Z"}
            },
            "Arrival": {
                "AirportCode": to,
                "ScheduledTimeUTC": {"DateTime": "2024-03-05T08:10Z"},
                "ActualTimeUTC": {"DateTime": null}
            },
            "MarketingCarrier": {"AirlineID": "LH", "FlightNumber": 400}
        })
    }

    #[test]
    fn test_extract_single_and_many_flights() {
        let resources = vec![
            doc(json!({"Flights": {"Flight": flight("FRA", "MUC")}})),
            doc(json!({"Flights": {"Flight": [flight("FRA", "JFK"), flight("FRA", "CDG")]}})),
            doc(json!({"Meta": {}})),
        ];

        let flights = extract_flights(&resources);

        let arrivals: Vec<&str> = flights
            .iter()
            .map(|f| f["Arrival"]["AirportCode"].as_str().unwrap())
            .collect();
        assert_eq!(arrivals, vec!["MUC", "JFK", "CDG"]);
    }

    #[test]
    fn test_flatten_document() {
        let row = flatten_document(&doc(flight("FRA", "MUC")));

        assert_eq!(row["Departure_AirportCode"].as_deref(), Some("FRA"));
        assert_eq!(
            row["Arrival_ScheduledTimeUTC_DateTime"].as_deref(),
            Some("2024-03-05T08:10Z")
        );
        assert_eq!(row["Arrival_ActualTimeUTC_DateTime"], None);
        assert_eq!(row["MarketingCarrier_FlightNumber"].as_deref(), Some("400"));
    }

    #[test]
    fn test_flatten_keeps_arrays_as_json() {
        let row = flatten_document(&doc(json!({"Codeshares": ["LX1", "OS2"]})));
        assert_eq!(row["Codeshares"].as_deref(), Some(r#"["LX1","OS2"]"#));
    }

    #[test]
    fn test_project_fills_missing_columns() {
        let mut partial = FlatRow::new();
        partial.insert("Departure_AirportCode".into(), Some("FRA".into()));
        partial.insert("Extra".into(), Some("x".into()));

        let batch = RowBatch::project(&[partial], FLIGHT_COLUMNS);

        assert_eq!(batch.columns.len(), FLIGHT_COLUMNS.len());
        assert_eq!(
            batch.rows[0],
            vec![Some("FRA".to_string()), None, None, None, None]
        );
    }

    #[test]
    fn test_structure_flights() {
        let resources = vec![doc(json!({"Flights": {"Flight": flight("FRA", "MUC")}}))];

        let batch = structure_flights(&resources);

        assert_eq!(batch.len(), 1);
        assert_eq!(
            batch.rows[0],
            vec![
                Some("FRA".to_string()),
                Some("2024-03-05T07:00Z".to_string()),
                Some("MUC".to_string()),
                Some("2024-03-05T08:10Z".to_string()),
                None,
            ]
        );
    }

    #[test]
    fn test_structure_no_flights() {
        let batch = structure_flights(&[]);

        assert!(batch.is_empty());
        assert_eq!(batch.columns.len(), FLIGHT_COLUMNS.len());
    }
}
