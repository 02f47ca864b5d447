//! Document store interface.

use async_trait::async_trait;

use crate::model::{PublishedVersion, ReleaseDateCache, ServiceRecord};

/// Result type for document store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during document store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Store backend error: {0}")]
    Backend(String),

    #[cfg(feature = "mongodb")]
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

/// One update of a bulk stage write: set `field` of document `id` to `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedField {
    pub id: String,
    /// Full dotted field path, e.g. `ecs.templive`.
    pub field: String,
    pub value: Vec<PublishedVersion>,
}

/// Documents matched and modified by a swap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwapOutcome {
    pub matched: u64,
    pub modified: u64,
}

impl SwapOutcome {
    /// Some matched documents were left unchanged.
    pub fn has_noop(&self) -> bool {
        self.matched > self.modified
    }
}

/// Interface for the store holding service documents and the release cache.
///
/// Implementations:
/// - `MongoDocumentStore`: MongoDB
/// - `MockDocumentStore`: in-memory, for tests
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Every service document, projected to id and name.
    async fn list_services(&self) -> Result<Vec<ServiceRecord>>;

    /// Apply all updates as one bulk write. Returns the number of documents
    /// the store reports as modified.
    async fn bulk_set_field(&self, updates: Vec<StagedField>) -> Result<u64>;

    /// For every document that has `staging_field`, copy it into
    /// `target_field` and remove `staging_field`, as one atomic update per
    /// document. Documents without `staging_field` are untouched.
    async fn promote_field(&self, staging_field: &str, target_field: &str) -> Result<SwapOutcome>;

    /// Load the release cache from the singleton document `key`.
    ///
    /// A missing document or field yields an empty cache.
    async fn load_release_cache(&self, key: &str) -> Result<ReleaseDateCache>;

    /// Replace the release cache held by the singleton document `key`.
    async fn save_release_cache(&self, key: &str, cache: &ReleaseDateCache) -> Result<()>;
}
