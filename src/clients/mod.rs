//! External service clients.

pub mod github;
pub mod mock;

#[cfg(feature = "aws")]
pub mod ecr;
#[cfg(feature = "aws")]
pub mod ecs;

pub use github::GithubReleaseClient;

#[cfg(feature = "aws")]
pub use ecr::EcrRegistryClient;
#[cfg(feature = "aws")]
pub use ecs::EcsClusterClient;

/// Load shared AWS configuration from the default provider chain.
///
/// `region` overrides the region the chain would pick.
#[cfg(feature = "aws")]
pub async fn load_aws_config(region: Option<&str>) -> aws_config::SdkConfig {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest());
    if let Some(region) = region {
        loader = loader.region(aws_config::Region::new(region.to_string()));
    }
    loader.load().await
}
