//! Configuration of the external sources a run reads from.

use serde::Deserialize;

/// Default GitHub repository API root; release URLs append `/{repo}/releases/tags/{tag}`.
pub const DEFAULT_RELEASES_BASE_URL: &str = "https://api.github.com/repos";

/// Default environment variable holding the GitHub token.
pub const DEFAULT_TOKEN_ENV: &str = "GH_TOKEN";

/// Container registry and cluster location (AWS).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry account id; the caller's default registry when unset.
    pub registry_id: Option<String>,
    /// AWS region for the registry and cluster clients.
    pub region: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            registry_id: None,
            region: Some("eu-west-2".to_string()),
        }
    }
}

/// Release information API.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReleasesConfig {
    /// Repository API root, usually including the owner,
    /// e.g. `https://api.github.com/repos/my-org`.
    pub base_url: String,
    /// Environment variable holding the bearer token.
    pub token_env: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    pub user_agent: String,
    /// `Accept` header sent with every request.
    pub accept: String,
}

impl Default for ReleasesConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_RELEASES_BASE_URL.to_string(),
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            timeout_ms: 5000,
            user_agent: "tagvane".to_string(),
            accept: "application/vnd.github+json".to_string(),
        }
    }
}

impl ReleasesConfig {
    /// Token read from `token_env`, if set and non-empty.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|token| !token.is_empty())
    }
}

/// Running-image scan settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Environment the scan refreshes.
    pub environment: String,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            environment: "cidev".to_string(),
        }
    }
}
