//! tagvane-sync: registry version sync
//!
//! Resolves the current version of every service per environment from
//! container registry tags, enriches them with release dates and publishes
//! them to the service documents.
//!
//! ## Flow
//! ```text
//! [MongoDB projects] --> service list
//!         |
//!         v
//! [ECR DescribeImages] --> resolve --> [GitHub releases] --> enrich
//!         |
//!         v
//! stage <root>.temp<env> --> swap into <root>.<env> --> save release cache
//! ```
//!
//! ## Configuration
//! - `--config <path>` / TAGVANE_CONFIG: YAML config file
//! - TAGVANE__*: overrides, e.g. TAGVANE__STORAGE__MONGODB__HOST_AND_PORT
//! - GH_TOKEN: GitHub token (name configurable via releases.token_env)

use std::sync::Arc;

use tracing::{error, info};

use tagvane::clients::{load_aws_config, EcrRegistryClient, GithubReleaseClient};
use tagvane::config::Config;
use tagvane::storage::init_document_store;
use tagvane::sync;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tagvane::utils::bootstrap::init_tracing();

    let config_path = tagvane::utils::bootstrap::parse_config_path();
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;
    let options = config.sync_options()?;

    info!(
        environments = options.environments.len(),
        concurrency = options.concurrency,
        "Starting tagvane-sync"
    );

    let store = init_document_store(&config.storage).await?;
    let aws = load_aws_config(config.registry.region.as_deref()).await;
    let registry = Arc::new(EcrRegistryClient::new(&aws, config.registry.registry_id.clone()));
    let releases = Arc::new(GithubReleaseClient::new(&config.releases)?);

    let report = sync::run(store, registry, releases, &options)
        .await
        .map_err(|e| {
            error!("Sync failed: {}", e);
            e
        })?;

    for (environment, outcome) in &report.publish.environments {
        info!(
            environment = %environment,
            matched = outcome.matched,
            modified = outcome.modified,
            "Published environment"
        );
    }
    info!(
        services = report.services,
        resolved_services = report.resolved_services,
        modified = report.publish.modified(),
        cached_services = report.cached_services,
        "tagvane-sync complete"
    );

    Ok(())
}
