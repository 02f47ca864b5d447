//! tagvane-scan: running-image scan
//!
//! Refreshes one environment (`scan.environment`, default `cidev`) with the
//! versions actually running in the ECS clusters of the configured region.
//!
//! ## Configuration
//! Same sources as tagvane-sync. TAGVANE__SCAN__ENVIRONMENT selects the
//! environment to refresh.

use std::sync::Arc;

use tracing::{error, info};

use tagvane::clients::{load_aws_config, EcsClusterClient, GithubReleaseClient};
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

    info!(environment = %config.scan.environment, "Starting tagvane-scan");

    let store = init_document_store(&config.storage).await?;
    let aws = load_aws_config(config.registry.region.as_deref()).await;
    let cluster = Arc::new(EcsClusterClient::new(&aws));
    let releases = Arc::new(GithubReleaseClient::new(&config.releases)?);

    let report = sync::run_scan(store, cluster, releases, &options, &config.scan.environment)
        .await
        .map_err(|e| {
            error!("Scan failed: {}", e);
            e
        })?;

    let (matched, modified) = report
        .outcome
        .map(|o| (o.matched, o.modified))
        .unwrap_or_default();
    info!(
        environment = %report.environment,
        images = report.images,
        running_services = report.running_services,
        matched,
        modified,
        "tagvane-scan complete"
    );

    Ok(())
}
