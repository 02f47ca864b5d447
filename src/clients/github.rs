//! GitHub releases client.
//!
//! Looks up `GET {base_url}/{repo}/releases/tags/{tag}` and reads the
//! release's `published_at`. The service name is the repository name and
//! the version is the release tag.

use std::time::Duration;

use async_trait::async_trait;
use backon::Retryable;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::ReleasesConfig;
use crate::interfaces::release_info::{ReleaseInfoClient, ReleaseInfoError, Result};
use crate::utils::retry::release_backoff;

/// The part of a release payload we read.
#[derive(Debug, Deserialize)]
struct ReleaseResponse {
    published_at: Option<DateTime<Utc>>,
}

/// Release info client backed by the GitHub REST API.
pub struct GithubReleaseClient {
    client: Client,
    base_url: String,
}

impl GithubReleaseClient {
    /// Build a client from configuration, reading the token from the
    /// configured environment variable.
    pub fn new(config: &ReleasesConfig) -> Result<Self> {
        let token = config.token();
        if token.is_none() {
            warn!(token_env = %config.token_env, "No GitHub token set, requests are unauthenticated");
        }
        Self::with_token(config, token.as_deref())
    }

    pub fn with_token(config: &ReleasesConfig, token: Option<&str>) -> Result<Self> {
        if config.base_url.is_empty() {
            return Err(ReleaseInfoError::Config(
                "releases.base_url not configured".to_string(),
            ));
        }

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value(&config.user_agent)?);
        headers.insert(ACCEPT, header_value(&config.accept)?);
        if let Some(token) = token {
            let mut auth = header_value(&format!("Bearer {}", token))?;
            auth.set_sensitive(true);
            headers.insert(AUTHORIZATION, auth);
        }

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn release_url(&self, repo: &str, tag: &str) -> String {
        format!("{}/{}/releases/tags/{}", self.base_url, repo, tag)
    }

    async fn fetch(&self, url: &str) -> Result<Option<DateTime<Utc>>> {
        let response = self.client.get(url).send().await?;
        if !release_exists(response.status(), url)? {
            debug!(url = %url, "No release for tag");
            return Ok(None);
        }

        let release: ReleaseResponse = response.json().await?;
        Ok(release.published_at)
    }
}

/// `Ok(false)` for a missing release, `Ok(true)` for a body worth reading.
fn release_exists(status: StatusCode, url: &str) -> Result<bool> {
    if status == StatusCode::NOT_FOUND {
        return Ok(false);
    }
    if !status.is_success() {
        return Err(ReleaseInfoError::UnexpectedStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(true)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| ReleaseInfoError::Config(format!("Invalid header value: {}", e)))
}

#[async_trait]
impl ReleaseInfoClient for GithubReleaseClient {
    async fn release_date(&self, service: &str, version: &str) -> Result<Option<DateTime<Utc>>> {
        let url = self.release_url(service, version);
        debug!(service = %service, version = %version, "Retrieving release info");

        (|| async { self.fetch(&url).await })
            .retry(release_backoff())
            .when(ReleaseInfoError::is_retryable)
            .notify(|e, delay| {
                warn!(url = %url, error = %e, retry_in = ?delay, "Release lookup failed, retrying");
            })
            .await
    }
}
