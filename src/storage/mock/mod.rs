//! Mock document store for testing.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::interfaces::document_store::{
    DocumentStore, Result, StagedField, StoreError, SwapOutcome,
};
use crate::model::{PublishedVersion, ReleaseDateCache, ServiceRecord};

/// In-memory service document. Fields are keyed by full dotted path.
#[derive(Debug, Clone, Default)]
struct StoredService {
    name: String,
    fields: BTreeMap<String, Vec<PublishedVersion>>,
}

/// Mock document store that keeps service documents and caches in memory.
///
/// Update counts follow MongoDB semantics: a `$set` to an identical value
/// does not count as modified.
#[derive(Default)]
pub struct MockDocumentStore {
    services: RwLock<BTreeMap<String, StoredService>>,
    caches: RwLock<HashMap<String, ReleaseDateCache>>,
    fail_on_read: RwLock<bool>,
    fail_on_write: RwLock<bool>,
    fail_on_cache_load: RwLock<bool>,
    fail_on_cache_save: RwLock<bool>,
    /// Documents whose promotion matches but reports no modification.
    unmodified_on_swap: RwLock<HashSet<String>>,
}

impl MockDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_service(&self, id: &str, name: &str) {
        self.services.write().await.insert(
            id.to_string(),
            StoredService {
                name: name.to_string(),
                fields: BTreeMap::new(),
            },
        );
    }

    /// Set a field directly, bypassing the stage protocol.
    pub async fn set_field(&self, id: &str, field: &str, value: Vec<PublishedVersion>) {
        if let Some(service) = self.services.write().await.get_mut(id) {
            service.fields.insert(field.to_string(), value);
        }
    }

    pub async fn field(&self, id: &str, field: &str) -> Option<Vec<PublishedVersion>> {
        self.services
            .read()
            .await
            .get(id)
            .and_then(|service| service.fields.get(field).cloned())
    }

    /// Every field of document `id`, or `None` if it does not exist.
    pub async fn fields(&self, id: &str) -> Option<BTreeMap<String, Vec<PublishedVersion>>> {
        self.services
            .read()
            .await
            .get(id)
            .map(|service| service.fields.clone())
    }

    pub async fn set_cache(&self, key: &str, cache: ReleaseDateCache) {
        self.caches.write().await.insert(key.to_string(), cache);
    }

    pub async fn cache(&self, key: &str) -> Option<ReleaseDateCache> {
        self.caches.read().await.get(key).cloned()
    }

    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }

    pub async fn set_fail_on_write(&self, fail: bool) {
        *self.fail_on_write.write().await = fail;
    }

    pub async fn set_fail_on_cache_load(&self, fail: bool) {
        *self.fail_on_cache_load.write().await = fail;
    }

    pub async fn set_fail_on_cache_save(&self, fail: bool) {
        *self.fail_on_cache_save.write().await = fail;
    }

    /// Make swaps match document `id` without counting it as modified, as
    /// MongoDB reports when a concurrent writer already applied the update.
    pub async fn set_unmodified_on_swap(&self, id: &str) {
        self.unmodified_on_swap.write().await.insert(id.to_string());
    }

    async fn check_write(&self) -> Result<()> {
        if *self.fail_on_write.read().await {
            return Err(StoreError::Backend("Mock write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MockDocumentStore {
    async fn list_services(&self) -> Result<Vec<ServiceRecord>> {
        if *self.fail_on_read.read().await {
            return Err(StoreError::Connection("Mock read failure".to_string()));
        }
        Ok(self
            .services
            .read()
            .await
            .iter()
            .map(|(id, service)| ServiceRecord::new(id.clone(), service.name.clone()))
            .collect())
    }

    async fn bulk_set_field(&self, updates: Vec<StagedField>) -> Result<u64> {
        self.check_write().await?;

        let mut services = self.services.write().await;
        let mut modified = 0;
        for update in updates {
            let Some(service) = services.get_mut(&update.id) else {
                continue;
            };
            let previous = service.fields.insert(update.field, update.value.clone());
            if previous.as_ref() != Some(&update.value) {
                modified += 1;
            }
        }
        Ok(modified)
    }

    async fn promote_field(&self, staging_field: &str, target_field: &str) -> Result<SwapOutcome> {
        self.check_write().await?;

        let unmodified = self.unmodified_on_swap.read().await;
        let mut services = self.services.write().await;
        let mut outcome = SwapOutcome::default();
        for (id, service) in services.iter_mut() {
            let Some(value) = service.fields.remove(staging_field) else {
                continue;
            };
            service.fields.insert(target_field.to_string(), value);
            outcome.matched += 1;
            // Removing the staging field always changes the document
            if !unmodified.contains(id) {
                outcome.modified += 1;
            }
        }
        Ok(outcome)
    }

    async fn load_release_cache(&self, key: &str) -> Result<ReleaseDateCache> {
        if *self.fail_on_cache_load.read().await {
            return Err(StoreError::Connection("Mock cache load failure".to_string()));
        }
        Ok(self.caches.read().await.get(key).cloned().unwrap_or_default())
    }

    async fn save_release_cache(&self, key: &str, cache: &ReleaseDateCache) -> Result<()> {
        if *self.fail_on_cache_save.read().await {
            return Err(StoreError::Backend("Mock cache save failure".to_string()));
        }
        self.caches
            .write()
            .await
            .insert(key.to_string(), cache.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn versions(vs: &[&str]) -> Vec<PublishedVersion> {
        vs.iter()
            .map(|v| PublishedVersion {
                version: v.to_string(),
                release_date: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_list_services_in_id_order() {
        let store = MockDocumentStore::new();
        store.add_service("b", "billing").await;
        store.add_service("a", "auth").await;

        let services = store.list_services().await.unwrap();
        assert_eq!(
            services,
            vec![ServiceRecord::new("a", "auth"), ServiceRecord::new("b", "billing")]
        );
    }

    #[tokio::test]
    async fn test_bulk_set_counts_changed_documents() {
        let store = MockDocumentStore::new();
        store.add_service("a", "auth").await;
        store.add_service("b", "billing").await;
        store.set_field("b", "ecs.tempcidev", versions(&["1.0.0"])).await;

        let modified = store
            .bulk_set_field(vec![
                StagedField {
                    id: "a".to_string(),
                    field: "ecs.tempcidev".to_string(),
                    value: versions(&["2.0.0"]),
                },
                StagedField {
                    id: "b".to_string(),
                    field: "ecs.tempcidev".to_string(),
                    value: versions(&["1.0.0"]),
                },
                StagedField {
                    id: "ghost".to_string(),
                    field: "ecs.tempcidev".to_string(),
                    value: vec![],
                },
            ])
            .await
            .unwrap();

        assert_eq!(modified, 1);
        assert_eq!(store.field("a", "ecs.tempcidev").await, Some(versions(&["2.0.0"])));
        assert!(store.fields("ghost").await.is_none());
    }

    #[tokio::test]
    async fn test_promote_field() {
        let store = MockDocumentStore::new();
        store.add_service("a", "auth").await;
        store.add_service("b", "billing").await;
        store.set_field("a", "templive", versions(&["1.0.0"])).await;
        store.set_field("b", "live", versions(&["0.9.0"])).await;

        let outcome = store.promote_field("templive", "live").await.unwrap();

        assert_eq!(outcome, SwapOutcome { matched: 1, modified: 1 });
        assert_eq!(store.field("a", "live").await, Some(versions(&["1.0.0"])));
        assert_eq!(store.field("a", "templive").await, None);
        assert_eq!(store.field("b", "live").await, Some(versions(&["0.9.0"])));
    }

    #[tokio::test]
    async fn test_release_cache_round_trip_and_missing_key() {
        let store = MockDocumentStore::new();
        assert!(store.load_release_cache("cfg").await.unwrap().is_empty());

        let mut cache = ReleaseDateCache::new();
        cache
            .entry("svc".to_string())
            .or_default()
            .insert("1.0.0".to_string(), None);
        store.save_release_cache("cfg", &cache).await.unwrap();

        assert_eq!(store.load_release_cache("cfg").await.unwrap(), cache);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = MockDocumentStore::new();
        store.set_fail_on_read(true).await;
        store.set_fail_on_write(true).await;
        store.set_fail_on_cache_load(true).await;
        store.set_fail_on_cache_save(true).await;

        assert!(store.list_services().await.is_err());
        assert!(store.bulk_set_field(vec![]).await.is_err());
        assert!(store.promote_field("t", "f").await.is_err());
        assert!(store.load_release_cache("cfg").await.is_err());
        assert!(store
            .save_release_cache("cfg", &ReleaseDateCache::new())
            .await
            .is_err());
    }
}
