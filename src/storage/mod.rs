//! Storage implementations.

use std::sync::Arc;

use crate::config::StorageConfig;
use crate::interfaces::DocumentStore;

pub mod mock;

#[cfg(feature = "mongodb")]
pub mod mongodb;

#[cfg(feature = "mongodb")]
pub use mongodb::MongoDocumentStore;

pub use mock::MockDocumentStore;

/// Initialize the document store based on configuration.
pub async fn init_document_store(
    config: &StorageConfig,
) -> Result<Arc<dyn DocumentStore>, Box<dyn std::error::Error>> {
    #[cfg(feature = "mongodb")]
    {
        let mongodb = &config.mongodb;
        tracing::info!(
            "Storage: mongodb at {} ({}.{})",
            mongodb.redacted_uri(),
            mongodb.database,
            mongodb.projects_collection
        );
        let store = MongoDocumentStore::connect(mongodb).await?;
        Ok(Arc::new(store))
    }

    #[cfg(not(feature = "mongodb"))]
    {
        let _ = config;
        tracing::error!("MongoDB storage requested but 'mongodb' feature is not enabled");
        Err("MongoDB feature not enabled".into())
    }
}
