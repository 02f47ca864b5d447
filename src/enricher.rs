//! Release date enrichment with a rebuilt cache.
//!
//! Two snapshots are kept for a run:
//! - `previous`: the cache loaded at startup, read-only.
//! - `current`: every `(service, version)` resolved during this run.
//!
//! Only `current` is persisted, so the stored cache is rebuilt each run and
//! services or versions nobody referenced drop out of it.
//!
//! Tasks for different services enrich concurrently. A lookup that misses
//! `previous` goes through a per-key [`OnceCell`], so concurrent tasks asking
//! for the same unseen version share a single external call.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use crate::interfaces::ReleaseInfoClient;
use crate::model::{EnvironmentVersionMap, ReleaseDateCache};

/// Outcome of an external lookup, shared by every task waiting on the key.
#[derive(Debug, Clone, Copy)]
enum Lookup {
    Resolved(Option<DateTime<Utc>>),
    Failed,
}

type LookupCell = Arc<OnceCell<Lookup>>;

#[derive(Default)]
struct EnricherState {
    current: ReleaseDateCache,
    lookups: HashMap<(String, String), LookupCell>,
}

/// Resolves release dates for resolved versions.
pub struct ReleaseDateEnricher {
    client: Arc<dyn ReleaseInfoClient>,
    previous: ReleaseDateCache,
    state: Mutex<EnricherState>,
}

impl ReleaseDateEnricher {
    /// Create an enricher seeded with the cache loaded at startup.
    pub fn new(client: Arc<dyn ReleaseInfoClient>, previous: ReleaseDateCache) -> Self {
        Self {
            client,
            previous,
            state: Mutex::new(EnricherState::default()),
        }
    }

    /// Fill in `release_date` for every non-empty entry of `map`.
    pub async fn enrich(&self, service: &str, map: &mut EnvironmentVersionMap) {
        self.state
            .lock()
            .await
            .current
            .entry(service.to_string())
            .or_default();

        for entry in map.entries_mut() {
            if entry.is_empty() {
                continue;
            }
            entry.release_date = self.release_date(service, &entry.version).await;
        }
    }

    /// Release date of one version, consulting the caches first.
    ///
    /// Lookup failures yield `None` and are not recorded, so the next run
    /// asks again.
    pub async fn release_date(&self, service: &str, version: &str) -> Option<DateTime<Utc>> {
        if let Some(cached) = self
            .previous
            .get(service)
            .and_then(|versions| versions.get(version))
        {
            let cached = *cached;
            self.record(service, version, cached).await;
            return cached;
        }

        let cell = {
            let mut state = self.state.lock().await;
            state
                .lookups
                .entry((service.to_string(), version.to_string()))
                .or_default()
                .clone()
        };

        let lookup = *cell.get_or_init(|| self.fetch(service, version)).await;

        match lookup {
            Lookup::Resolved(date) => {
                self.record(service, version, date).await;
                date
            }
            Lookup::Failed => None,
        }
    }

    async fn fetch(&self, service: &str, version: &str) -> Lookup {
        match self.client.release_date(service, version).await {
            Ok(date) => {
                debug!(service = %service, version = %version, release_date = ?date, "Fetched release date");
                Lookup::Resolved(date)
            }
            Err(e) => {
                warn!(service = %service, version = %version, error = %e, "Release lookup failed");
                Lookup::Failed
            }
        }
    }

    async fn record(&self, service: &str, version: &str, date: Option<DateTime<Utc>>) {
        self.state
            .lock()
            .await
            .current
            .entry(service.to_string())
            .or_default()
            .insert(version.to_string(), date);
    }

    /// Copy of the cache rebuilt so far.
    pub async fn snapshot(&self) -> ReleaseDateCache {
        self.state.lock().await.current.clone()
    }

    /// Consume the enricher, yielding the rebuilt cache.
    pub fn into_snapshot(self) -> ReleaseDateCache {
        self.state.into_inner().current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::mock::MockReleaseClient;
    use crate::environment::EnvironmentSet;
    use crate::resolver::resolve;
    use crate::model::ImageTags;
    use chrono::TimeZone;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn date(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    fn cache(entries: &[(&str, &str, Option<DateTime<Utc>>)]) -> ReleaseDateCache {
        let mut cache = ReleaseDateCache::new();
        for (service, version, date) in entries {
            cache
                .entry(service.to_string())
                .or_default()
                .insert(version.to_string(), *date);
        }
        cache
    }

    fn live_map(version: &str) -> EnvironmentVersionMap {
        resolve(
            "svc",
            &[ImageTags::new([version, "live"])],
            &EnvironmentSet::default(),
        )
    }

    #[tokio::test]
    async fn test_cache_hit_skips_client() {
        let client = Arc::new(MockReleaseClient::new());
        let enricher = ReleaseDateEnricher::new(
            client.clone(),
            cache(&[("svcA", "1.0.0", Some(date(1)))]),
        );

        assert_eq!(enricher.release_date("svcA", "1.0.0").await, Some(date(1)));
        assert_eq!(client.call_count(), 0);

        let rebuilt = enricher.into_snapshot();
        assert_eq!(rebuilt, cache(&[("svcA", "1.0.0", Some(date(1)))]));
    }

    #[tokio::test]
    async fn test_cached_null_is_a_hit() {
        let client = Arc::new(MockReleaseClient::new());
        client.set_release("svc", "1.0.0", date(5)).await;
        let enricher = ReleaseDateEnricher::new(client.clone(), cache(&[("svc", "1.0.0", None)]));

        assert_eq!(enricher.release_date("svc", "1.0.0").await, None);
        assert_eq!(client.call_count(), 0);
        assert_eq!(enricher.snapshot().await, cache(&[("svc", "1.0.0", None)]));
    }

    #[tokio::test]
    async fn test_miss_fetches_once_and_records() {
        let client = Arc::new(MockReleaseClient::new());
        client.set_release("svc", "2.0.0", date(2)).await;
        let enricher = ReleaseDateEnricher::new(client.clone(), ReleaseDateCache::new());

        assert_eq!(enricher.release_date("svc", "2.0.0").await, Some(date(2)));
        assert_eq!(enricher.release_date("svc", "2.0.0").await, Some(date(2)));
        // Unknown release is recorded as an explicit null
        assert_eq!(enricher.release_date("svc", "3.0.0").await, None);

        assert_eq!(client.call_count(), 2);
        assert_eq!(
            enricher.into_snapshot(),
            cache(&[("svc", "2.0.0", Some(date(2))), ("svc", "3.0.0", None)])
        );
    }

    #[tokio::test]
    async fn test_unreferenced_entries_are_pruned() {
        let client = Arc::new(MockReleaseClient::new());
        let previous = cache(&[
            ("svc", "1.0.0", Some(date(1))),
            ("svc", "0.9.0", Some(date(2))),
            ("retired", "5.0.0", None),
        ]);
        let enricher = ReleaseDateEnricher::new(client, previous);

        let mut map = live_map("1.0.0");
        enricher.enrich("svc", &mut map).await;

        assert_eq!(map.get("live").unwrap().release_date, Some(date(1)));
        let rebuilt = enricher.into_snapshot();
        assert_eq!(rebuilt, cache(&[("svc", "1.0.0", Some(date(1)))]));
        assert!(!rebuilt.contains_key("retired"));
    }

    #[tokio::test]
    async fn test_enriched_service_without_versions_keeps_empty_entry() {
        let client = Arc::new(MockReleaseClient::new());
        let enricher = ReleaseDateEnricher::new(client.clone(), ReleaseDateCache::new());

        let mut map = EnvironmentVersionMap::empty(&EnvironmentSet::default());
        enricher.enrich("quiet", &mut map).await;

        assert_eq!(client.call_count(), 0);
        let mut expected = ReleaseDateCache::new();
        expected.insert("quiet".to_string(), BTreeMap::new());
        assert_eq!(enricher.into_snapshot(), expected);
    }

    #[tokio::test]
    async fn test_failed_lookup_is_absent_and_not_cached() {
        let client = Arc::new(MockReleaseClient::new());
        client.set_fail_on("svc", "1.0.0").await;
        let enricher = ReleaseDateEnricher::new(client.clone(), ReleaseDateCache::new());

        let mut map = live_map("1.0.0");
        enricher.enrich("svc", &mut map).await;

        assert_eq!(map.get("live").unwrap().release_date, None);
        assert_eq!(map.get("live").unwrap().version, "1.0.0");
        let rebuilt = enricher.into_snapshot();
        assert!(rebuilt["svc"].is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_lookups_share_one_call() {
        let client = Arc::new(MockReleaseClient::new().with_delay(Duration::from_millis(30)));
        client.set_release("svc", "1.0.0", date(3)).await;
        let enricher = Arc::new(ReleaseDateEnricher::new(client.clone(), ReleaseDateCache::new()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let enricher = Arc::clone(&enricher);
                tokio::spawn(async move { enricher.release_date("svc", "1.0.0").await })
            })
            .collect();

        for task in tasks {
            assert_eq!(task.await.unwrap(), Some(date(3)));
        }
        assert_eq!(client.call_count(), 1);
    }
}
