//! Container registry interface.

use async_trait::async_trait;

use crate::model::ImageTags;

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors that can occur while reading tags from a registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("Registry request failed for {service}: {message}")]
    Request { service: String, message: String },
}

/// Interface for reading a service's image tags.
///
/// Implementations:
/// - `EcrRegistryClient`: AWS ECR
/// - `MockRegistryClient`: in-memory, for tests
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// All images of the service's repository with their tags.
    ///
    /// Implementations handle pagination and credentials; images and the
    /// tags within each image come back in registry order.
    async fn list_tags(&self, service: &str) -> Result<Vec<ImageTags>>;
}
