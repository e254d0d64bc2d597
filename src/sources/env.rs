//! Environment variable configuration source.

use super::ConfigSource;
use crate::error::{InvalidatorError, Result};
use config::Environment;
use std::collections::HashMap;

/// Prefix of the variables the listener reads by default
/// (`REDIS_HOST`, `REDIS_PORT`, `REDIS_PASS`, ...).
pub const REDIS_ENV_PREFIX: &str = "REDIS";

/// Short form accepted for `password` (`REDIS_PASS`).
const PASSWORD_SHORTHAND: &str = "pass";

/// Environment variable configuration source.
///
/// Loads settings from environment variables with a specified prefix and a
/// separator for nested keys. The prefix itself is always joined with `_`.
///
/// Values are kept as strings and only converted when deserialized into a
/// typed field, so a password such as `007` reaches the server unchanged.
/// `<PREFIX>_PASS` is read as `password` and wins over `<PREFIX>_PASSWORD`.
///
/// # Examples
///
/// ```rust
/// use keyspace_invalidator::sources::EnvSource;
///
/// // REDIS_HOST=cache.local -> host = "cache.local"
/// // REDIS_RECONNECT__MAX_ATTEMPTS=3 -> reconnect.max_attempts = 3
/// let source = EnvSource::new("REDIS", "__");
/// ```
pub struct EnvSource {
    prefix: String,
    separator: String,
    priority: i32,
    vars: Option<HashMap<String, String>>,
}

impl EnvSource {
    /// Create a new environment variable source.
    ///
    /// # Arguments
    ///
    /// * `prefix` - Prefix for environment variables (e.g., "REDIS")
    /// * `separator` - Separator for nested keys (e.g., "__" for REDIS_RECONNECT__MAX_ATTEMPTS)
    pub fn new(prefix: impl Into<String>, separator: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            separator: separator.into(),
            priority: 300, // Env vars have highest priority by default
            vars: None,
        }
    }

    /// The conventional `REDIS_*` source.
    pub fn redis() -> Self {
        Self::new(REDIS_ENV_PREFIX, "__")
    }

    /// Set the priority for this source.
    ///
    /// Higher priority sources override lower priority ones.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Read from the given variables instead of the process environment.
    pub fn with_vars<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.vars = Some(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        self
    }
}

impl ConfigSource for EnvSource {
    fn load(&self) -> Result<HashMap<String, config::Value>> {
        let env_source = Environment::with_prefix(&self.prefix)
            .prefix_separator("_")
            .separator(&self.separator)
            .source(self.vars.clone());

        let config_builder = config::Config::builder()
            .add_source(env_source)
            .build()
            .map_err(|e| {
                InvalidatorError::Config(format!("Failed to load environment variables: {}", e))
            })?;

        let mut map = config_builder
            .try_deserialize::<HashMap<String, config::Value>>()
            .map_err(|e| {
                InvalidatorError::Deserialization(format!(
                    "Failed to parse environment variables: {}",
                    e
                ))
            })?;

        if let Some(password) = map.remove(PASSWORD_SHORTHAND) {
            map.insert("password".to_string(), password);
        }

        Ok(map)
    }

    fn name(&self) -> String {
        format!("env:{}_*", self.prefix)
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}
