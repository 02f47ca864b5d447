//! Deployment environments.
//!
//! The set of tracked environments is configuration, not a literal baked
//! into the maps: the resolver, the publisher and the running-image scan
//! all take one [`EnvironmentSet`] so they agree on keys and order.

use std::fmt;

/// Prefix of the staging field a run writes before swapping it into place.
pub const STAGING_PREFIX: &str = "temp";

/// Environments tracked when configuration does not say otherwise.
pub const DEFAULT_ENVIRONMENTS: [&str; 3] = ["cidev", "staging", "live"];

/// Errors raised while building an environment set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnvironmentError {
    #[error("At least one environment must be configured")]
    Empty,

    #[error("Invalid environment name {0:?}: use letters, digits, '-' or '_'")]
    InvalidName(String),

    #[error("Environment {0:?} is listed more than once")]
    Duplicate(String),

    #[error("Unknown environment {0:?}")]
    Unknown(String),
}

/// A named deployment stage, e.g. `live`.
///
/// Only constructed through [`EnvironmentSet`], so every `Environment` in
/// flight belongs to the configured set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Environment(String);

impl Environment {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of the field a run stages `environment` into (`live` -> `templive`).
pub fn staging_field_name(environment: &Environment) -> String {
    format!("{}{}", STAGING_PREFIX, environment.as_str())
}

/// Ordered, closed set of tracked environments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentSet {
    environments: Vec<Environment>,
}

impl EnvironmentSet {
    /// Build a set from names, keeping their order.
    ///
    /// Names must be non-empty, field-safe (`[A-Za-z0-9_-]`) and unique
    /// ignoring case, since tag matching is case-insensitive.
    pub fn new<I, S>(names: I) -> Result<Self, EnvironmentError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut environments: Vec<Environment> = Vec::new();

        for name in names {
            let name = name.as_ref().trim();
            let valid = !name.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            if !valid {
                return Err(EnvironmentError::InvalidName(name.to_string()));
            }
            if environments
                .iter()
                .any(|e| e.0.eq_ignore_ascii_case(name))
            {
                return Err(EnvironmentError::Duplicate(name.to_string()));
            }
            environments.push(Environment(name.to_string()));
        }

        if environments.is_empty() {
            return Err(EnvironmentError::Empty);
        }

        Ok(Self { environments })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Environment> {
        self.environments.iter()
    }

    pub fn len(&self) -> usize {
        self.environments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.environments.is_empty()
    }

    /// Look up a member by exact name.
    pub fn get(&self, name: &str) -> Option<&Environment> {
        self.environments.iter().find(|e| e.as_str() == name)
    }

    /// Like [`get`](Self::get), but an unknown name is an error.
    pub fn require(&self, name: &str) -> Result<&Environment, EnvironmentError> {
        self.get(name)
            .ok_or_else(|| EnvironmentError::Unknown(name.to_string()))
    }
}

impl Default for EnvironmentSet {
    fn default() -> Self {
        Self {
            environments: DEFAULT_ENVIRONMENTS
                .iter()
                .map(|name| Environment(name.to_string()))
                .collect(),
        }
    }
}
