//! Top-level sync runs.
//!
//! [`run`] is the full registry sync: load the release cache, list
//! services, aggregate every service, publish each environment through
//! the stage-then-swap protocol, then persist the rebuilt cache.
//!
//! [`run_scan`] refreshes a single environment from a cluster's running
//! images.

use std::sync::Arc;

use tracing::{info, warn};

use crate::enricher::ReleaseDateEnricher;
use crate::environment::{EnvironmentError, EnvironmentSet};
use crate::interfaces::{
    ClusterClient, ClusterError, DocumentStore, RegistryClient, ReleaseInfoClient, StoreError,
};
use crate::model::ReleaseDateCache;
use crate::orchestrator::{Aggregator, DEFAULT_CONCURRENCY};
use crate::publish::{FieldLayout, PublishReport, StagedPublisher};
use crate::scan::{RunningImageScan, ScanReport};

/// Errors that abort a run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Document store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Environment error: {0}")]
    Environment(#[from] EnvironmentError),
}

/// Settings shared by both run kinds.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub environments: EnvironmentSet,
    /// Services aggregated concurrently.
    pub concurrency: usize,
    /// Id of the singleton document holding the release cache.
    pub cache_key: String,
    pub layout: FieldLayout,
}

impl SyncOptions {
    pub fn new(cache_key: impl Into<String>) -> Self {
        Self {
            environments: EnvironmentSet::default(),
            concurrency: DEFAULT_CONCURRENCY,
            cache_key: cache_key.into(),
            layout: FieldLayout::default(),
        }
    }
}

/// Summary of a completed registry sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub services: usize,
    /// Services that resolved at least one environment.
    pub resolved_services: usize,
    pub publish: PublishReport,
    /// Services held by the persisted cache.
    pub cached_services: usize,
}

/// Run the full registry sync.
///
/// Store failures other than the cache load are fatal. The cache is saved
/// only after every environment has been published.
#[tracing::instrument(name = "sync.run", skip_all, fields(cache_key = %options.cache_key))]
pub async fn run(
    store: Arc<dyn DocumentStore>,
    registry: Arc<dyn RegistryClient>,
    releases: Arc<dyn ReleaseInfoClient>,
    options: &SyncOptions,
) -> Result<SyncReport, SyncError> {
    let previous = load_cache(store.as_ref(), &options.cache_key).await;
    let services = store.list_services().await?;
    info!(services = services.len(), "Listed services");

    let enricher = Arc::new(ReleaseDateEnricher::new(releases, previous));
    let aggregator = Aggregator::new(
        registry,
        Arc::clone(&enricher),
        options.environments.clone(),
        options.concurrency,
    );
    let results = aggregator.aggregate(&services).await;
    let resolved_services = results
        .values()
        .filter(|map| !map.has_no_versions())
        .count();

    let publisher = StagedPublisher::new(Arc::clone(&store), options.layout.clone());
    let publish = publisher
        .publish(&services, &results, &options.environments)
        .await?;

    let cache = enricher.snapshot().await;
    store.save_release_cache(&options.cache_key, &cache).await?;
    info!(cached_services = cache.len(), "Saved release cache");

    Ok(SyncReport {
        services: services.len(),
        resolved_services,
        publish,
        cached_services: cache.len(),
    })
}

/// Refresh `environment` from the images running in a cluster.
///
/// Release dates come from the persisted cache or the release client, but
/// the cache itself is left as the registry sync wrote it.
#[tracing::instrument(name = "sync.scan", skip_all, fields(environment = %environment))]
pub async fn run_scan(
    store: Arc<dyn DocumentStore>,
    cluster: Arc<dyn ClusterClient>,
    releases: Arc<dyn ReleaseInfoClient>,
    options: &SyncOptions,
    environment: &str,
) -> Result<ScanReport, SyncError> {
    let environment = options.environments.require(environment)?.clone();

    let previous = load_cache(store.as_ref(), &options.cache_key).await;
    let services = store.list_services().await?;
    info!(services = services.len(), "Listed services");

    let enricher = Arc::new(ReleaseDateEnricher::new(releases, previous));
    let publisher = StagedPublisher::new(store, options.layout.clone());
    let scan = RunningImageScan::new(cluster, enricher, publisher);

    scan.scan(&services, &environment).await
}

async fn load_cache(store: &dyn DocumentStore, key: &str) -> ReleaseDateCache {
    match store.load_release_cache(key).await {
        Ok(cache) => {
            info!(cached_services = cache.len(), "Loaded release cache");
            cache
        }
        Err(e) => {
            warn!(error = %e, "Failed to load release cache, starting empty");
            ReleaseDateCache::new()
        }
    }
}
