//! Relational upload of structured flights
//!
//! Rows are appended to a table of TEXT columns. A row already present in
//! the table (every column equal) is skipped, so uploading the same batch
//! twice leaves the table unchanged.

use flightlog_common::types::quote_identifier;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashSet;
use tracing::info;

use crate::error::{IngestError, Result};
use crate::flights::RowBatch;

/// Postgres accepts at most this many bind parameters per statement.
const MAX_BIND_PARAMS: usize = 65_535;

pub type TextRow = Vec<Option<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The table did not exist; it was created and filled
    TableCreated { inserted: usize },
    /// New rows were appended to an existing table
    Appended { inserted: usize },
    /// Every incoming row was already in the table
    NothingNew,
}

impl UploadOutcome {
    pub fn inserted(&self) -> usize {
        match self {
            UploadOutcome::TableCreated { inserted } | UploadOutcome::Appended { inserted } => {
                *inserted
            }
            UploadOutcome::NothingNew => 0,
        }
    }
}

/// Incoming rows that match no existing row, without repeats, in incoming
/// order.
pub fn select_new_rows(existing: &[TextRow], incoming: &[TextRow]) -> Vec<TextRow> {
    let mut seen: HashSet<&TextRow> = existing.iter().collect();
    let mut fresh = Vec::new();

    for row in incoming {
        if seen.insert(row) {
            fresh.push(row.clone());
        }
    }

    fresh
}

async fn table_exists(pool: &PgPool, quoted_table: &str) -> Result<bool> {
    Ok(sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
        .bind(quoted_table)
        .fetch_one(pool)
        .await?)
}

async fn existing_rows(pool: &PgPool, table: &str, columns: &[String]) -> Result<Vec<TextRow>> {
    let select = columns
        .iter()
        .map(|c| format!("{}::text", c))
        .collect::<Vec<_>>()
        .join(", ");

    let rows = sqlx::query(&format!("SELECT {} FROM {}", select, table))
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| {
            (0..columns.len())
                .map(|i| row.try_get::<Option<String>, _>(i).map_err(IngestError::from))
                .collect()
        })
        .collect()
}

async fn insert_rows(pool: &PgPool, table: &str, columns: &[String], rows: &[TextRow]) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let chunk_size = (MAX_BIND_PARAMS / columns.len().max(1)).max(1);
    let mut tx = pool.begin().await?;

    for chunk in rows.chunks(chunk_size) {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO {} ({}) ", table, columns.join(", ")));
        builder.push_values(chunk, |mut values, row| {
            for value in row {
                values.push_bind(value.clone());
            }
        });
        builder.build().execute(&mut *tx).await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Upload `batch` into `table`, creating the table when needed.
#[tracing::instrument(skip(pool, batch), fields(rows = batch.len()))]
pub async fn upload_rows(pool: &PgPool, table: &str, batch: &RowBatch) -> Result<UploadOutcome> {
    let quoted_table = quote_identifier(table)?;
    let columns = batch
        .columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<flightlog_common::Result<Vec<_>>>()?;

    if !table_exists(pool, &quoted_table).await? {
        let definition = columns
            .iter()
            .map(|c| format!("{} TEXT", c))
            .collect::<Vec<_>>()
            .join(", ");
        sqlx::query(&format!("CREATE TABLE IF NOT EXISTS {} ({})", quoted_table, definition))
            .execute(pool)
            .await?;

        let rows = select_new_rows(&[], &batch.rows);
        insert_rows(pool, &quoted_table, &columns, &rows).await?;

        info!(table = %table, inserted = rows.len(), "Table created and filled");
        return Ok(UploadOutcome::TableCreated { inserted: rows.len() });
    }

    if batch.is_empty() {
        info!(table = %table, "Empty batch, nothing to upload");
        return Ok(UploadOutcome::NothingNew);
    }

    let existing = existing_rows(pool, &quoted_table, &columns).await?;
    let rows = select_new_rows(&existing, &batch.rows);

    if rows.is_empty() {
        info!(table = %table, existing = existing.len(), "No new rows to upload");
        return Ok(UploadOutcome::NothingNew);
    }

    insert_rows(pool, &quoted_table, &columns, &rows).await?;
    info!(table = %table, inserted = rows.len(), "Rows appended");

    Ok(UploadOutcome::Appended { inserted: rows.len() })
}
