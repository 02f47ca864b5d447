//! Release info interface.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Result type for release lookups.
pub type Result<T> = std::result::Result<T, ReleaseInfoError>;

/// Errors that can occur while looking up a release.
///
/// A release that does not exist is not an error; see
/// [`ReleaseInfoClient::release_date`].
#[derive(Debug, thiserror::Error)]
pub enum ReleaseInfoError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ReleaseInfoError {
    /// Whether repeating the request could succeed.
    ///
    /// Timeouts, connection failures, throttling and server errors are
    /// transient; everything else is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReleaseInfoError::Http(err) => err.is_timeout() || err.is_connect(),
            ReleaseInfoError::UnexpectedStatus { status, .. } => {
                *status == 429 || (500..600).contains(status)
            }
            ReleaseInfoError::Config(_) => false,
        }
    }
}

/// Interface for resolving when a service version was released upstream.
///
/// Implementations:
/// - `GithubReleaseClient`: GitHub releases API
/// - `MockReleaseClient`: in-memory, for tests
#[async_trait]
pub trait ReleaseInfoClient: Send + Sync {
    /// Publish time of the release tagged `version` in the service's repo.
    ///
    /// Returns `Ok(None)` when no such release exists.
    async fn release_date(&self, service: &str, version: &str) -> Result<Option<DateTime<Utc>>>;
}
