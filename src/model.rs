//! Core data model: services, per-environment version maps and the
//! persisted version form.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::environment::{Environment, EnvironmentSet};

/// Release dates keyed by service, then version.
///
/// `None` records a lookup that found no release, so it is not repeated.
pub type ReleaseDateCache = BTreeMap<String, BTreeMap<String, Option<DateTime<Utc>>>>;

/// A service document as listed by the document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    /// Store-assigned document id.
    pub id: String,
    /// Service name; also the registry repository and release repo name.
    pub name: String,
}

impl ServiceRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Tags the registry assigned to one image, in registry order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageTags {
    pub tags: Vec<String>,
}

impl ImageTags {
    /// Build from tags, dropping repeats while keeping first-seen order.
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut deduped: Vec<String> = Vec::new();
        for tag in tags {
            let tag = tag.into();
            if !deduped.contains(&tag) {
                deduped.push(tag);
            }
        }
        Self { tags: deduped }
    }
}

/// The winning version for one environment.
///
/// An empty entry (`version == ""`) means no signal was found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionEntry {
    pub version: String,
    /// Deploy time taken from the environment tag. Never persisted.
    pub deploy_timestamp: Option<DateTime<Utc>>,
    pub release_date: Option<DateTime<Utc>>,
}

impl VersionEntry {
    pub fn is_empty(&self) -> bool {
        self.version.is_empty()
    }

    /// Persisted form, or `None` for an empty entry.
    pub fn published(&self) -> Option<PublishedVersion> {
        (!self.is_empty()).then(|| PublishedVersion {
            version: self.version.clone(),
            release_date: self.release_date,
        })
    }
}

/// Environment -> winning version, with every configured environment present.
///
/// Keys are fixed at construction; there is no way to add or remove one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentVersionMap {
    entries: Vec<(Environment, VersionEntry)>,
}

impl EnvironmentVersionMap {
    /// All environments present, all entries empty.
    pub fn empty(environments: &EnvironmentSet) -> Self {
        Self {
            entries: environments
                .iter()
                .map(|env| (env.clone(), VersionEntry::default()))
                .collect(),
        }
    }

    pub fn get(&self, environment: &str) -> Option<&VersionEntry> {
        self.entries
            .iter()
            .find(|(env, _)| env.as_str() == environment)
            .map(|(_, entry)| entry)
    }

    pub(crate) fn get_mut(&mut self, environment: &Environment) -> Option<&mut VersionEntry> {
        self.entries
            .iter_mut()
            .find(|(env, _)| env == environment)
            .map(|(_, entry)| entry)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Environment, &VersionEntry)> {
        self.entries.iter().map(|(env, entry)| (env, entry))
    }

    pub(crate) fn entries_mut(&mut self) -> impl Iterator<Item = &mut VersionEntry> {
        self.entries.iter_mut().map(|(_, entry)| entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when no environment has a version.
    pub fn has_no_versions(&self) -> bool {
        self.entries.iter().all(|(_, entry)| entry.is_empty())
    }
}

/// A version as written to a service document: `{version, releaseDate}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedVersion {
    pub version: String,
    pub release_date: Option<DateTime<Utc>>,
}

/// Numeric ordering of `major.minor.patch` strings.
///
/// Components compare as unbounded integers, so `1.10.0 > 1.9.0` and
/// arbitrarily long components never overflow.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let l = l.trim_start_matches('0');
                let r = r.trim_start_matches('0');
                let ord = l.len().cmp(&r.len()).then_with(|| l.cmp(r));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

/// Sort by version and drop repeated versions, keeping the first occurrence.
pub fn normalize_published(mut versions: Vec<PublishedVersion>) -> Vec<PublishedVersion> {
    versions.sort_by(|a, b| compare_versions(&a.version, &b.version));
    versions.dedup_by(|later, earlier| later.version == earlier.version);
    versions
}
