//! Running-image scan.
//!
//! Refreshes one environment from what a cluster is actually running,
//! rather than from registry tags. Every running container image is
//! parsed into `(name, version)`; images whose name is a known service
//! contribute that version. Each listed service is then staged with the
//! sorted set of its observed versions (empty when that service is not
//! running) and the environment field is swapped into place. A cluster
//! reporting no images at all leaves the environment untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::enricher::ReleaseDateEnricher;
use crate::environment::Environment;
use crate::interfaces::{ClusterClient, SwapOutcome};
use crate::model::{PublishedVersion, ServiceRecord};
use crate::publish::StagedPublisher;
use crate::sync::SyncError;
use crate::tags::is_version_tag;

/// `registry/path/name:version`; the name is the last path segment.
static IMAGE_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^/]+):([^:]+)$").expect("valid image reference regex"));

/// Split an image reference into `(name, version)`.
///
/// Returns `None` when the reference carries no tag.
pub fn parse_image_reference(image: &str) -> Option<(&str, &str)> {
    let captures = IMAGE_REFERENCE.captures(image)?;
    let name = captures.get(1)?.as_str();
    let version = captures.get(2)?.as_str();
    Some((name, version))
}

/// Versions observed per service name, for names that are known services.
pub fn observed_versions(
    images: &[String],
    services: &[ServiceRecord],
) -> BTreeMap<String, BTreeSet<String>> {
    let known: BTreeSet<&str> = services.iter().map(|s| s.name.as_str()).collect();
    let mut observed: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for image in images {
        let Some((name, version)) = parse_image_reference(image) else {
            debug!(image = %image, "Skipping untagged image");
            continue;
        };
        if !known.contains(name) {
            debug!(image = %image, "No service document for image");
            continue;
        }
        observed
            .entry(name.to_string())
            .or_default()
            .insert(version.to_string());
    }

    observed
}

/// Result of one scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub environment: Environment,
    /// Running images reported by the cluster.
    pub images: usize,
    /// Services with at least one running image.
    pub running_services: usize,
    /// `None` when nothing was running and the environment was left as is.
    pub outcome: Option<SwapOutcome>,
}

/// Publishes the versions a cluster is running into one environment.
pub struct RunningImageScan {
    cluster: Arc<dyn ClusterClient>,
    enricher: Arc<ReleaseDateEnricher>,
    publisher: StagedPublisher,
}

impl RunningImageScan {
    pub fn new(
        cluster: Arc<dyn ClusterClient>,
        enricher: Arc<ReleaseDateEnricher>,
        publisher: StagedPublisher,
    ) -> Self {
        Self {
            cluster,
            enricher,
            publisher,
        }
    }

    #[tracing::instrument(name = "scan", skip_all, fields(environment = %environment))]
    pub async fn scan(
        &self,
        services: &[ServiceRecord],
        environment: &Environment,
    ) -> Result<ScanReport, SyncError> {
        let images = self.cluster.running_images().await?;
        let observed = observed_versions(&images, services);
        info!(images = images.len(), running_services = observed.len(), "Scanned cluster");

        if images.is_empty() {
            warn!("No running images, leaving environment unchanged");
            return Ok(ScanReport {
                environment: environment.clone(),
                images: 0,
                running_services: 0,
                outcome: None,
            });
        }

        let mut values = Vec::with_capacity(services.len());
        for service in services {
            let mut versions = Vec::new();
            for version in observed.get(&service.name).into_iter().flatten() {
                let release_date = if is_version_tag(version) {
                    self.enricher.release_date(&service.name, version).await
                } else {
                    None
                };
                versions.push(PublishedVersion {
                    version: version.clone(),
                    release_date,
                });
            }
            values.push((service.id.clone(), versions));
        }

        let outcome = self.publisher.publish_environment(environment, values).await?;

        Ok(ScanReport {
            environment: environment.clone(),
            images: images.len(),
            running_services: observed.len(),
            outcome: Some(outcome),
        })
    }
}
