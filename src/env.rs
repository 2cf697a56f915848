//! Environment lookups.
//!
//! Everything that reads the process environment goes through [`EnvSource`] so the
//! detector, the recommender and the factory can be driven from a fixed map in tests.

use std::collections::HashMap;

/// Connection URL variables, highest priority first.
pub const DATABASE_URL_VARS: [&str; 5] = [
    "DATABASE_URL",
    "POSTGRES_URL",
    "POSTGRES_PRISMA_URL",
    "NEON_DATABASE_URL",
    "MYSQL_URL",
];

/// Explicit driver override.
pub const DATABASE_DRIVER_VAR: &str = "DATABASE_DRIVER";
/// Default maximum pool size.
pub const DATABASE_POOL_SIZE_VAR: &str = "DATABASE_POOL_SIZE";
/// Turns on per-statement debug logging.
pub const DATABASE_DEBUG_VAR: &str = "DATABASE_DEBUG";
/// Connection URL of the RLS-bypassing tier.
pub const PRIVILEGED_DATABASE_URL_VAR: &str = "DATABASE_PRIVILEGED_URL";
/// Connection URL of the full-privilege tier.
pub const ADMIN_DATABASE_URL_VAR: &str = "DATABASE_ADMIN_URL";

pub trait EnvSource: Send + Sync {
    /// Value of `key`, `None` when unset or empty.
    fn var(&self, key: &str) -> Option<String>;

    /// First non-empty value among `keys`, with the key it came from.
    fn first_of(&self, keys: &[&'static str]) -> Option<(&'static str, String)> {
        keys.iter()
            .find_map(|key| self.var(key).map(|value| (*key, value)))
    }

    fn flag(&self, key: &str) -> bool {
        self.var(key)
            .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
    }
}

/// The real process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

/// A fixed set of variables.
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapEnv {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl EnvSource for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars
            .get(key)
            .filter(|v| !v.trim().is_empty())
            .cloned()
    }
}
