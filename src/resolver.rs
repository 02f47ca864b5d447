//! Environment version resolution.
//!
//! Turns one service's registry tags into the version that is current in
//! each environment. Images are walked in registry order, and within an
//! image tags are walked in tag order; the outcome depends on that order
//! when candidates rank equally, so neither is ever re-sorted.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::environment::EnvironmentSet;
use crate::model::{EnvironmentVersionMap, ImageTags, VersionEntry};
use crate::tags::{extract_deploy_timestamp, is_version_tag, matches_environment};

/// Resolve the winning version per environment for one service.
///
/// Every environment in `environments` is present in the result; those
/// without a matching tag stay empty.
pub fn resolve(service: &str, images: &[ImageTags], environments: &EnvironmentSet) -> EnvironmentVersionMap {
    let mut map = EnvironmentVersionMap::empty(environments);

    for image in images {
        apply_image(&mut map, image, environments);
    }

    for (env, entry) in map.iter() {
        if !entry.is_empty() {
            debug!(
                service = %service,
                environment = %env,
                version = %entry.version,
                deployed = ?entry.deploy_timestamp,
                "Resolved environment version"
            );
        }
    }

    map
}

/// Offer one image's version tags to every environment it is tagged for.
fn apply_image(map: &mut EnvironmentVersionMap, image: &ImageTags, environments: &EnvironmentSet) {
    let version_tags: Vec<&str> = image
        .tags
        .iter()
        .map(String::as_str)
        .filter(|tag| is_version_tag(tag))
        .collect();

    // Without a version tag there is nothing to attribute to an environment.
    if version_tags.is_empty() {
        return;
    }

    for env in environments.iter() {
        let Some(env_tag) = image
            .tags
            .iter()
            .find(|tag| matches_environment(tag, env.as_str()))
        else {
            continue;
        };

        let deployed = extract_deploy_timestamp(env_tag);
        let Some(entry) = map.get_mut(env) else {
            continue;
        };

        for version in &version_tags {
            if supersedes(entry, deployed) {
                *entry = VersionEntry {
                    version: (*version).to_string(),
                    deploy_timestamp: deployed,
                    release_date: None,
                };
            }
        }
    }
}

/// Tie-break between the current winner and a candidate deployed at `candidate`.
///
/// Untimestamped ranks lowest, later timestamps beat earlier ones, and
/// anything else keeps the first-seen winner.
fn supersedes(current: &VersionEntry, candidate: Option<DateTime<Utc>>) -> bool {
    if current.is_empty() {
        return true;
    }
    match (current.deploy_timestamp, candidate) {
        (Some(existing), Some(offered)) => offered > existing,
        (None, Some(_)) => true,
        _ => false,
    }
}
