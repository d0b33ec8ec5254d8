//! Document collection backed by a Postgres JSONB table
//!
//! Each collection is a table of one JSONB column. JSONB equality compares
//! objects structurally and ignores key order, which is exactly the
//! exact-document match the inserter probes with.

use async_trait::async_trait;
use flightlog_common::types::quote_identifier;
use flightlog_common::Document;
use sqlx::types::Json;
use sqlx::PgPool;
use tracing::{debug, info};

use crate::collection::DocumentCollection;
use crate::error::{StorageError, StorageResult};

#[derive(Debug, Clone)]
pub struct PgDocumentCollection {
    pool: PgPool,
    name: String,
    quoted: String,
}

impl PgDocumentCollection {
    /// Open the collection `name`, creating its table on first use.
    #[tracing::instrument(skip(pool))]
    pub async fn ensure(pool: &PgPool, name: &str) -> StorageResult<Self> {
        let quoted =
            quote_identifier(name).map_err(|e| StorageError::unavailable(name, e))?;

        let exists: bool = sqlx::query_scalar("SELECT to_regclass($1) IS NOT NULL")
            .bind(&quoted)
            .fetch_one(pool)
            .await
            .map_err(|e| StorageError::unavailable(name, e))?;

        if !exists {
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id BIGSERIAL PRIMARY KEY,
                    document JSONB NOT NULL,
                    inserted_at TIMESTAMPTZ NOT NULL DEFAULT now()
                )",
                quoted
            ))
            .execute(pool)
            .await
            .map_err(|e| StorageError::unavailable(name, e))?;

            sqlx::query(&format!("CREATE INDEX ON {} USING hash (document)", quoted))
                .execute(pool)
                .await
                .map_err(|e| StorageError::unavailable(name, e))?;

            info!(collection = %name, "Collection created");
        } else {
            debug!(collection = %name, "Collection already exists");
        }

        Ok(Self {
            pool: pool.clone(),
            name: name.to_string(),
            quoted,
        })
    }

    /// Every stored document, oldest first.
    pub async fn all_documents(&self) -> StorageResult<Vec<Document>> {
        let rows: Vec<Json<Document>> =
            sqlx::query_scalar(&format!("SELECT document FROM {} ORDER BY id", self.quoted))
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StorageError::unavailable(&self.name, e))?;

        Ok(rows.into_iter().map(|Json(doc)| doc).collect())
    }

    pub async fn count(&self) -> StorageResult<i64> {
        sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.quoted))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::unavailable(&self.name, e))
    }
}

#[async_trait]
impl DocumentCollection for PgDocumentCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_one(&self, pattern: &Document) -> StorageResult<Option<Document>> {
        let found: Option<Json<Document>> = sqlx::query_scalar(&format!(
            "SELECT document FROM {} WHERE document = $1 LIMIT 1",
            self.quoted
        ))
        .bind(Json(pattern))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::probe(&self.name, e))?;

        Ok(found.map(|Json(doc)| doc))
    }

    async fn insert_one(&self, document: &Document) -> StorageResult<()> {
        sqlx::query(&format!("INSERT INTO {} (document) VALUES ($1)", self.quoted))
            .bind(Json(document))
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::insert(&self.name, e))?;

        Ok(())
    }
}
