//! Staged publish of per-environment versions.
//!
//! Publishing one environment is two store operations:
//! 1. **Stage**: a single bulk write setting every service's staging field
//!    (`<root>.temp<env>`) to its versions for that environment.
//! 2. **Swap**: a single pipeline update that, on every document holding a
//!    staging field, copies it into `<root>.<env>` and unsets it.
//!
//! Readers of `<root>.<env>` see either the previous or the new value,
//! never a half-written one. The two phases are not transactional with
//! each other: a crash in between leaves staging fields behind, and the
//! next run's stage overwrites them before its swap promotes them.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::environment::{staging_field_name, Environment, EnvironmentSet};
use crate::interfaces::document_store::{DocumentStore, Result, StagedField, SwapOutcome};
use crate::model::{normalize_published, EnvironmentVersionMap, PublishedVersion, ServiceRecord};

/// Field under which environment arrays are nested in service documents.
pub const DEFAULT_FIELD_ROOT: &str = "ecs";

/// Where environment fields live inside a service document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLayout {
    root: String,
}

impl FieldLayout {
    /// Nest environment fields under `root`; an empty root puts them at
    /// the top level of the document.
    pub fn new(root: impl Into<String>) -> Self {
        Self { root: root.into() }
    }

    /// Field readers consume, e.g. `ecs.live`.
    pub fn target_field(&self, environment: &Environment) -> String {
        self.path(environment.as_str())
    }

    /// Field a run stages into, e.g. `ecs.templive`.
    pub fn staging_field(&self, environment: &Environment) -> String {
        self.path(&staging_field_name(environment))
    }

    fn path(&self, leaf: &str) -> String {
        if self.root.is_empty() {
            leaf.to_string()
        } else {
            format!("{}.{}", self.root, leaf)
        }
    }
}

impl Default for FieldLayout {
    fn default() -> Self {
        Self::new(DEFAULT_FIELD_ROOT)
    }
}

/// Swap outcome of every published environment, in publish order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub environments: Vec<(Environment, SwapOutcome)>,
}

impl PublishReport {
    pub fn outcome(&self, environment: &str) -> Option<SwapOutcome> {
        self.environments
            .iter()
            .find(|(env, _)| env.as_str() == environment)
            .map(|(_, outcome)| *outcome)
    }

    /// Total documents modified across all environments.
    pub fn modified(&self) -> u64 {
        self.environments.iter().map(|(_, o)| o.modified).sum()
    }
}

/// Writes aggregated versions through the stage-then-swap protocol.
pub struct StagedPublisher {
    store: Arc<dyn DocumentStore>,
    layout: FieldLayout,
}

impl StagedPublisher {
    pub fn new(store: Arc<dyn DocumentStore>, layout: FieldLayout) -> Self {
        Self { store, layout }
    }

    /// Publish every environment of `environments` for all `services`.
    ///
    /// A service without an entry in `results` is published as empty.
    /// Stops at the first store error.
    #[tracing::instrument(name = "publish", skip_all, fields(services = services.len()))]
    pub async fn publish(
        &self,
        services: &[ServiceRecord],
        results: &HashMap<String, EnvironmentVersionMap>,
        environments: &EnvironmentSet,
    ) -> Result<PublishReport> {
        let mut report = PublishReport::default();

        for env in environments.iter() {
            let values = services
                .iter()
                .map(|service| {
                    let versions = results
                        .get(&service.name)
                        .and_then(|map| map.get(env.as_str()))
                        .and_then(|entry| entry.published())
                        .into_iter()
                        .collect();
                    (service.id.clone(), versions)
                })
                .collect();

            let outcome = self.publish_environment(env, values).await?;
            report.environments.push((env.clone(), outcome));
        }

        Ok(report)
    }

    /// Stage `values` (document id -> versions) for one environment and
    /// swap them into place.
    pub async fn publish_environment(
        &self,
        environment: &Environment,
        values: Vec<(String, Vec<PublishedVersion>)>,
    ) -> Result<SwapOutcome> {
        self.stage(environment, values).await?;
        self.swap(environment).await
    }

    /// Bulk-write the staging field of every listed document.
    pub async fn stage(
        &self,
        environment: &Environment,
        values: Vec<(String, Vec<PublishedVersion>)>,
    ) -> Result<u64> {
        if values.is_empty() {
            return Ok(0);
        }

        let field = self.layout.staging_field(environment);
        let updates: Vec<StagedField> = values
            .into_iter()
            .map(|(id, versions)| StagedField {
                id,
                field: field.clone(),
                value: normalize_published(versions),
            })
            .collect();
        let count = updates.len();

        let modified = self.store.bulk_set_field(updates).await?;
        info!(environment = %environment, field = %field, staged = count, modified, "Staged environment");
        Ok(modified)
    }

    /// Promote the staging field into the environment field on every
    /// document that has one.
    pub async fn swap(&self, environment: &Environment) -> Result<SwapOutcome> {
        let staging = self.layout.staging_field(environment);
        let target = self.layout.target_field(environment);

        let outcome = self.store.promote_field(&staging, &target).await?;

        if outcome.has_noop() {
            warn!(
                environment = %environment,
                matched = outcome.matched,
                modified = outcome.modified,
                "Swap left some matched documents unchanged"
            );
        } else {
            info!(
                environment = %environment,
                matched = outcome.matched,
                modified = outcome.modified,
                "Swapped {} -> {}",
                staging,
                target
            );
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::VersionEntry;
    use crate::storage::mock::MockDocumentStore;

    fn version(v: &str) -> PublishedVersion {
        PublishedVersion {
            version: v.to_string(),
            release_date: None,
        }
    }

    #[test]
    fn test_field_layout() {
        let envs = EnvironmentSet::default();
        let live = envs.get("live").unwrap();

        let nested = FieldLayout::default();
        assert_eq!(nested.target_field(live), "ecs.live");
        assert_eq!(nested.staging_field(live), "ecs.templive");

        let flat = FieldLayout::new("");
        assert_eq!(flat.target_field(live), "live");
        assert_eq!(flat.staging_field(live), "templive");
    }

    #[tokio::test]
    async fn test_swap_promotes_only_staged_documents() {
        let store = Arc::new(MockDocumentStore::new());
        store.add_service("A", "alpha").await;
        store.add_service("B", "beta").await;
        store.set_field("A", "templive", vec![version("1.0.0")]).await;

        let publisher = StagedPublisher::new(store.clone(), FieldLayout::new(""));
        let envs = EnvironmentSet::default();
        let outcome = publisher.swap(envs.get("live").unwrap()).await.unwrap();

        assert_eq!(outcome.matched, 1);
        assert_eq!(store.field("A", "live").await, Some(vec![version("1.0.0")]));
        assert_eq!(store.field("A", "templive").await, None);
        assert!(store.fields("B").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_writes_every_environment() {
        let store = Arc::new(MockDocumentStore::new());
        store.add_service("id-1", "checkout-api").await;
        store.add_service("id-2", "billing").await;

        let envs = EnvironmentSet::default();
        let mut map = EnvironmentVersionMap::empty(&envs);
        *map.get_mut(envs.get("cidev").unwrap()).unwrap() = VersionEntry {
            version: "1.2.4".to_string(),
            deploy_timestamp: None,
            release_date: None,
        };
        let mut results = HashMap::new();
        results.insert("checkout-api".to_string(), map);

        let services = store.list_services().await.unwrap();
        let publisher = StagedPublisher::new(store.clone(), FieldLayout::default());
        let report = publisher.publish(&services, &results, &envs).await.unwrap();

        assert_eq!(report.environments.len(), 3);
        assert_eq!(report.outcome("cidev").unwrap().matched, 2);
        assert_eq!(
            store.field("id-1", "ecs.cidev").await,
            Some(vec![version("1.2.4")])
        );
        assert_eq!(store.field("id-1", "ecs.live").await, Some(vec![]));
        // Service missing from results is published empty
        assert_eq!(store.field("id-2", "ecs.cidev").await, Some(vec![]));
        for id in ["id-1", "id-2"] {
            let fields = store.fields(id).await.unwrap();
            assert!(fields.keys().all(|f| !f.starts_with("ecs.temp")));
        }
    }

    #[tokio::test]
    async fn test_stage_sorts_and_dedups() {
        let store = Arc::new(MockDocumentStore::new());
        store.add_service("id-1", "svc").await;
        let publisher = StagedPublisher::new(store.clone(), FieldLayout::default());
        let envs = EnvironmentSet::default();
        let cidev = envs.get("cidev").unwrap();

        publisher
            .stage(
                cidev,
                vec![(
                    "id-1".to_string(),
                    vec![version("1.10.0"), version("1.9.0"), version("1.10.0")],
                )],
            )
            .await
            .unwrap();

        assert_eq!(
            store.field("id-1", "ecs.tempcidev").await,
            Some(vec![version("1.9.0"), version("1.10.0")])
        );
        // Not visible until swapped
        assert_eq!(store.field("id-1", "ecs.cidev").await, None);
    }

    #[tokio::test]
    async fn test_swap_reclaims_leftover_staging_fields() {
        let store = Arc::new(MockDocumentStore::new());
        store.add_service("id-1", "svc").await;
        store.set_field("id-1", "ecs.staging", vec![version("0.1.0")]).await;
        store.set_field("id-1", "ecs.tempstaging", vec![version("0.2.0")]).await;

        let publisher = StagedPublisher::new(store.clone(), FieldLayout::default());
        let envs = EnvironmentSet::default();
        let outcome = publisher
            .publish_environment(envs.get("staging").unwrap(), vec![])
            .await
            .unwrap();

        assert_eq!(outcome, SwapOutcome { matched: 1, modified: 1 });
        assert_eq!(
            store.field("id-1", "ecs.staging").await,
            Some(vec![version("0.2.0")])
        );
        // Swapping again is a no-op
        let again = publisher.swap(envs.get("staging").unwrap()).await.unwrap();
        assert_eq!(again, SwapOutcome::default());
    }

    #[tokio::test]
    async fn test_swap_reports_unmodified_documents() {
        let store = Arc::new(MockDocumentStore::new());
        store.add_service("id-1", "auth").await;
        store.add_service("id-2", "billing").await;
        store.set_unmodified_on_swap("id-2").await;

        let publisher = StagedPublisher::new(store.clone(), FieldLayout::default());
        let envs = EnvironmentSet::default();
        let services = store.list_services().await.unwrap();
        let report = publisher.publish(&services, &HashMap::new(), &envs).await.unwrap();

        let live = report.outcome("live").unwrap();
        assert_eq!(live, SwapOutcome { matched: 2, modified: 1 });
        assert!(live.has_noop());
        assert_eq!(report.modified(), 3);
        assert_eq!(store.field("id-2", "ecs.live").await, Some(vec![]));
    }

    #[tokio::test]
    async fn test_stage_failure_is_fatal() {
        let store = Arc::new(MockDocumentStore::new());
        store.add_service("id-1", "svc").await;
        store.set_fail_on_write(true).await;

        let publisher = StagedPublisher::new(store.clone(), FieldLayout::default());
        let envs = EnvironmentSet::default();
        let services = store.list_services().await.unwrap();
        let result = publisher.publish(&services, &HashMap::new(), &envs).await;

        assert!(result.is_err());
        assert_eq!(store.field("id-1", "ecs.cidev").await, None);
    }
}
