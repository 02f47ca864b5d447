//! Cluster interface for the running-image scan.

use async_trait::async_trait;

/// Result type for cluster operations.
pub type Result<T> = std::result::Result<T, ClusterError>;

/// Errors that can occur while inspecting a cluster.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("Cluster request failed: {0}")]
    Request(String),

    #[error("No clusters found")]
    NoClusters,
}

/// Interface for listing what is actually running.
///
/// Implementations:
/// - `EcsClusterClient`: AWS ECS
/// - `MockClusterClient`: in-memory, for tests
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Image references (`registry/repo:tag`) of every running container.
    ///
    /// Fails with [`ClusterError::NoClusters`] when there is nothing to
    /// inspect, so callers never mistake an unreachable cluster for an idle
    /// one.
    async fn running_images(&self) -> Result<Vec<String>>;
}
