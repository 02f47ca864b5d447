//! Abstract interfaces for tagvane collaborators.
//!
//! These traits define the contracts for:
//! - Container registry (tags per service)
//! - Release info (upstream release dates)
//! - Document store (service list, staged publish, release cache)
//! - Cluster (running container images)

pub mod cluster;
pub mod document_store;
pub mod registry;
pub mod release_info;

pub use cluster::{ClusterClient, ClusterError};
pub use document_store::{DocumentStore, StagedField, StoreError, SwapOutcome};
pub use registry::{RegistryClient, RegistryError};
pub use release_info::{ReleaseInfoClient, ReleaseInfoError};
