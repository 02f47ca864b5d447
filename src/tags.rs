//! Registry tag classification.
//!
//! Pure functions over tag strings: recognizing semantic-version tags,
//! matching environment tags, and pulling deploy timestamps out of tags
//! such as `cidev-2024-05-01_10-00-00`.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;

/// Release version tag, e.g. `153.2.17`. No pre/post-release suffixes.
static VERSION_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+$").expect("valid version regex"));

/// `yyyy?mm?dd?hh?mm?ss` with any single non-digit separator. ASCII digits only.
static DEPLOY_TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"([0-9]{4})[^0-9]([0-9]{2})[^0-9]([0-9]{2})[^0-9]([0-9]{2})[^0-9]([0-9]{2})[^0-9]([0-9]{2})",
    )
    .expect("valid deploy timestamp regex")
});

/// True iff the whole tag is a `major.minor.patch` version.
pub fn is_version_tag(tag: &str) -> bool {
    VERSION_TAG.is_match(tag)
}

/// Case-insensitive containment of the environment name in the tag.
pub fn matches_environment(tag: &str, environment: &str) -> bool {
    tag.to_lowercase().contains(&environment.to_lowercase())
}

/// Extract the deploy timestamp embedded anywhere in a tag.
///
/// The six captured groups are read as year, month, day, hour, minute and
/// second in UTC. Returns `None` when nothing matches or the captured fields
/// do not form a real instant (e.g. month 13).
pub fn extract_deploy_timestamp(tag: &str) -> Option<DateTime<Utc>> {
    let caps = DEPLOY_TIMESTAMP.captures(tag)?;
    let field = |i: usize| caps[i].parse::<u32>().ok();

    let year = caps[1].parse::<i32>().ok()?;
    NaiveDate::from_ymd_opt(year, field(2)?, field(3)?)?
        .and_hms_opt(field(4)?, field(5)?, field(6)?)
        .map(|naive| naive.and_utc())
}
