//! Bounded aggregation over every known service.
//!
//! Each service is resolved and enriched in its own task. A semaphore caps
//! how many of those pipelines are in flight, which keeps registry calls
//! under the API rate limit. A failing service never fails the run: its
//! result is replaced by the all-empty map and the error is logged.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{error, info, Instrument};

use crate::enricher::ReleaseDateEnricher;
use crate::environment::EnvironmentSet;
use crate::interfaces::{RegistryClient, RegistryError};
use crate::model::{EnvironmentVersionMap, ServiceRecord};
use crate::resolver::resolve;

/// Default number of services aggregated concurrently.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Runs resolution and enrichment for all services under a concurrency cap.
pub struct Aggregator {
    registry: Arc<dyn RegistryClient>,
    enricher: Arc<ReleaseDateEnricher>,
    environments: EnvironmentSet,
    limit: Arc<Semaphore>,
}

impl Aggregator {
    /// Create an aggregator running at most `concurrency` services at once.
    ///
    /// A `concurrency` of zero is treated as one; values above
    /// [`Semaphore::MAX_PERMITS`] are capped there.
    pub fn new(
        registry: Arc<dyn RegistryClient>,
        enricher: Arc<ReleaseDateEnricher>,
        environments: EnvironmentSet,
        concurrency: usize,
    ) -> Self {
        Self {
            registry,
            enricher,
            environments,
            limit: Arc::new(Semaphore::new(concurrency.clamp(1, Semaphore::MAX_PERMITS))),
        }
    }

    /// Aggregate every service, keyed by service name.
    ///
    /// Returns only after every service task has finished. Each listed
    /// service is present in the result.
    pub async fn aggregate(&self, services: &[ServiceRecord]) -> HashMap<String, EnvironmentVersionMap> {
        let handles: Vec<_> = services
            .iter()
            .map(|service| {
                let registry = Arc::clone(&self.registry);
                let enricher = Arc::clone(&self.enricher);
                let environments = self.environments.clone();
                let limit = Arc::clone(&self.limit);
                let name = service.name.clone();
                let span = tracing::info_span!("aggregate.service", service = %name);

                tokio::spawn(
                    async move {
                        let _permit = match limit.acquire_owned().await {
                            Ok(permit) => permit,
                            Err(e) => {
                                error!(error = %e, "Concurrency gate closed");
                                return EnvironmentVersionMap::empty(&environments);
                            }
                        };
                        match aggregate_service(registry.as_ref(), &enricher, &environments, &name).await {
                            Ok(map) => map,
                            Err(e) => {
                                error!(error = %e, "Failed to aggregate service, publishing empty versions");
                                EnvironmentVersionMap::empty(&environments)
                            }
                        }
                    }
                    .instrument(span),
                )
            })
            .collect();

        let outcomes = join_all(handles).await;

        let mut results = HashMap::with_capacity(services.len());
        for (service, outcome) in services.iter().zip(outcomes) {
            let map = outcome.unwrap_or_else(|e| {
                error!(service = %service.name, error = %e, "Service task aborted, publishing empty versions");
                EnvironmentVersionMap::empty(&self.environments)
            });
            results.insert(service.name.clone(), map);
        }

        info!(services = results.len(), "Aggregation complete");
        results
    }
}

async fn aggregate_service(
    registry: &dyn RegistryClient,
    enricher: &ReleaseDateEnricher,
    environments: &EnvironmentSet,
    service: &str,
) -> Result<EnvironmentVersionMap, RegistryError> {
    let images = registry.list_tags(service).await?;
    let mut map = resolve(service, &images, environments);
    enricher.enrich(service, &mut map).await;
    Ok(map)
}
