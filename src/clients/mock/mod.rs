//! Mock collaborator clients for testing.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::interfaces::cluster::{ClusterClient, ClusterError, Result as ClusterResult};
use crate::interfaces::registry::{RegistryClient, RegistryError, Result as RegistryResult};
use crate::interfaces::release_info::{
    ReleaseInfoClient, ReleaseInfoError, Result as ReleaseResult,
};
use crate::model::ImageTags;

/// Mock registry serving tags from memory.
///
/// Records how many `list_tags` calls are in flight at once so tests can
/// assert on the concurrency cap.
#[derive(Default)]
pub struct MockRegistryClient {
    images: RwLock<HashMap<String, Vec<ImageTags>>>,
    failing: RwLock<HashSet<String>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    calls: AtomicUsize,
}

impl MockRegistryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every call for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Serve one image per entry of `images`.
    pub async fn set_images(&self, service: &str, images: Vec<Vec<&str>>) {
        let images = images.into_iter().map(ImageTags::new).collect();
        self.images
            .write()
            .await
            .insert(service.to_string(), images);
    }

    pub async fn set_fail_on(&self, service: &str) {
        self.failing.write().await.insert(service.to_string());
    }

    /// Highest number of calls observed in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn answer(&self, service: &str) -> RegistryResult<Vec<ImageTags>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.read().await.contains(service) {
            return Err(RegistryError::Request {
                service: service.to_string(),
                message: "Mock registry failure".to_string(),
            });
        }
        self.images
            .read()
            .await
            .get(service)
            .cloned()
            .ok_or_else(|| RegistryError::RepositoryNotFound(service.to_string()))
    }
}

#[async_trait]
impl RegistryClient for MockRegistryClient {
    async fn list_tags(&self, service: &str) -> RegistryResult<Vec<ImageTags>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let result = self.answer(service).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Mock release info client serving dates from memory.
///
/// Unknown releases answer `Ok(None)`, like a 404 from the real API.
#[derive(Default)]
pub struct MockReleaseClient {
    releases: RwLock<HashMap<(String, String), DateTime<Utc>>>,
    failing: RwLock<HashSet<(String, String)>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockReleaseClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn set_release(&self, service: &str, version: &str, date: DateTime<Utc>) {
        self.releases
            .write()
            .await
            .insert((service.to_string(), version.to_string()), date);
    }

    pub async fn set_fail_on(&self, service: &str, version: &str) {
        self.failing
            .write()
            .await
            .insert((service.to_string(), version.to_string()));
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReleaseInfoClient for MockReleaseClient {
    async fn release_date(&self, service: &str, version: &str) -> ReleaseResult<Option<DateTime<Utc>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let key = (service.to_string(), version.to_string());
        if self.failing.read().await.contains(&key) {
            return Err(ReleaseInfoError::UnexpectedStatus {
                status: 503,
                url: format!("mock://{}/{}", service, version),
            });
        }
        Ok(self.releases.read().await.get(&key).copied())
    }
}

/// Mock cluster reporting a fixed list of running images.
#[derive(Default)]
pub struct MockClusterClient {
    images: RwLock<Vec<String>>,
    fail: RwLock<bool>,
    no_clusters: RwLock<bool>,
}

impl MockClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_running(&self, images: &[&str]) {
        *self.images.write().await = images.iter().map(|i| i.to_string()).collect();
    }

    pub async fn set_fail(&self, fail: bool) {
        *self.fail.write().await = fail;
    }

    /// Report that the region holds no clusters at all.
    pub async fn set_no_clusters(&self, no_clusters: bool) {
        *self.no_clusters.write().await = no_clusters;
    }
}

#[async_trait]
impl ClusterClient for MockClusterClient {
    async fn running_images(&self) -> ClusterResult<Vec<String>> {
        if *self.fail.read().await {
            return Err(ClusterError::Request("Mock cluster failure".to_string()));
        }
        if *self.no_clusters.read().await {
            return Err(ClusterError::NoClusters);
        }
        Ok(self.images.read().await.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_mock_registry_serves_and_fails() {
        let registry = MockRegistryClient::new();
        registry.set_images("svc", vec![vec!["1.0.0", "live"]]).await;
        registry.set_fail_on("broken").await;

        let images = registry.list_tags("svc").await.unwrap();
        assert_eq!(images, vec![ImageTags::new(["1.0.0", "live"])]);
        assert!(matches!(
            registry.list_tags("broken").await,
            Err(RegistryError::Request { .. })
        ));
        assert!(matches!(
            registry.list_tags("unknown").await,
            Err(RegistryError::RepositoryNotFound(_))
        ));
        assert_eq!(registry.call_count(), 3);
        assert_eq!(registry.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_mock_release_client() {
        let client = MockReleaseClient::new();
        let date = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        client.set_release("svc", "1.0.0", date).await;
        client.set_fail_on("svc", "2.0.0").await;

        assert_eq!(client.release_date("svc", "1.0.0").await.unwrap(), Some(date));
        assert_eq!(client.release_date("svc", "1.1.0").await.unwrap(), None);
        assert!(client.release_date("svc", "2.0.0").await.is_err());
        assert_eq!(client.call_count(), 3);
    }
}
