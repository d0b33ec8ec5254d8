//! Document collection interface
//!
//! The inserter only needs two operations from a store: an exact-document
//! probe and a single insert. Backends implement [`DocumentCollection`];
//! [`MemoryCollection`] keeps everything in process and backs `--dry-run`
//! loads and the unit tests.

use async_trait::async_trait;
use flightlog_common::Document;
use tokio::sync::RwLock;

use crate::error::StorageResult;

/// A growth-only set of documents addressable by structural match.
///
/// Implementations must be thread-safe (Send + Sync). The inserter awaits
/// every call before issuing the next one, so implementations see a strictly
/// sequential stream of probes and inserts per batch.
#[async_trait]
pub trait DocumentCollection: Send + Sync {
    /// Collection name, used in logs and errors.
    fn name(&self) -> &str;

    /// Return a stored document structurally equal to `pattern`, if any.
    async fn find_one(&self, pattern: &Document) -> StorageResult<Option<Document>>;

    /// Store `document`.
    async fn insert_one(&self, document: &Document) -> StorageResult<()>;
}

/// In-memory collection.
///
/// Probes are a linear scan, which is fine for tests and dry runs over a
/// handful of files.
#[derive(Debug)]
pub struct MemoryCollection {
    name: String,
    documents: RwLock<Vec<Document>>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(Vec::new()),
        }
    }

    /// Create a collection pre-populated with `documents`.
    pub fn with_documents(name: impl Into<String>, documents: Vec<Document>) -> Self {
        Self {
            name: name.into(),
            documents: RwLock::new(documents),
        }
    }

    /// Snapshot of the stored documents in insertion order.
    pub async fn documents(&self) -> Vec<Document> {
        self.documents.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_one(&self, pattern: &Document) -> StorageResult<Option<Document>> {
        let documents = self.documents.read().await;
        Ok(documents.iter().find(|doc| *doc == pattern).cloned())
    }

    async fn insert_one(&self, document: &Document) -> StorageResult<()> {
        self.documents.write().await.push(document.clone());
        Ok(())
    }
}
