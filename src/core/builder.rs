//! Builder for constructing invalidation listeners.

use crate::core::{ConfigLoader, InvalidatorConfig, Validate};
use crate::error::{InvalidatorError, Result, ValidationError};
use crate::notify::{Connector, InvalidationListener};
use crate::sources::{ConfigSource, EnvSource, FileSource};
use std::path::PathBuf;
use std::sync::Arc;

#[cfg(feature = "redis-transport")]
use crate::notify::RedisConnector;

/// Type alias for extra validators run after the built-in checks.
type ConfigValidator =
    Arc<dyn Fn(&InvalidatorConfig) -> std::result::Result<(), ValidationError> + Send + Sync>;

/// Builder for constructing an [`InvalidationListener`].
///
/// Settings come either from an explicit [`InvalidatorConfig`] or from layered
/// sources (files, then custom sources, then environment variables).
///
/// # Examples
///
/// ```rust,no_run
/// use keyspace_invalidator::prelude::*;
///
/// # fn example() -> Result<()> {
/// let listener = InvalidatorBuilder::new()
///     .with_file("config/invalidator.yaml")
///     .with_redis_env()
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct InvalidatorBuilder {
    file_paths: Vec<(PathBuf, bool)>,
    env_prefix: Option<String>,
    env_separator: Option<String>,
    custom_sources: Vec<Box<dyn ConfigSource>>,
    explicit: Option<InvalidatorConfig>,
    validators: Vec<ConfigValidator>,
}

impl InvalidatorBuilder {
    /// Create a new builder with no sources.
    pub fn new() -> Self {
        Self {
            file_paths: Vec::new(),
            env_prefix: None,
            env_separator: None,
            custom_sources: Vec::new(),
            explicit: None,
            validators: Vec::new(),
        }
    }

    /// Add a required settings file (YAML, TOML, or JSON).
    ///
    /// Later files override earlier ones.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_paths.push((path.into(), true));
        self
    }

    /// Add a settings file that is skipped when it does not exist.
    pub fn with_optional_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_paths.push((path.into(), false));
        self
    }

    /// Add environment variable overrides with a custom prefix.
    ///
    /// # Arguments
    ///
    /// * `prefix` - Prefix for environment variables (e.g., "REDIS")
    /// * `separator` - Separator for nested keys (e.g., "__" for REDIS_RECONNECT__MAX_ATTEMPTS)
    pub fn with_env_overrides(mut self, prefix: &str, separator: &str) -> Self {
        self.env_prefix = Some(prefix.to_string());
        self.env_separator = Some(separator.to_string());
        self
    }

    /// Add the conventional `REDIS_HOST` / `REDIS_PORT` / `REDIS_PASS` overrides.
    pub fn with_redis_env(self) -> Self {
        self.with_env_overrides(crate::sources::REDIS_ENV_PREFIX, "__")
    }

    /// Add a custom configuration source.
    pub fn with_source<S: ConfigSource + 'static>(mut self, source: S) -> Self {
        self.custom_sources.push(Box::new(source));
        self
    }

    /// Use these settings as-is instead of loading from sources.
    pub fn with_config(mut self, config: InvalidatorConfig) -> Self {
        self.explicit = Some(config);
        self
    }

    /// Add a validation function that must pass before a listener is built.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keyspace_invalidator::prelude::*;
    ///
    /// let builder = InvalidatorBuilder::new()
    ///     .with_config(InvalidatorConfig::new("localhost", 6379))
    ///     .with_validation(|config| {
    ///         if config.password.is_none() {
    ///             return Err(ValidationError::invalid_field("password", "required in production"));
    ///         }
    ///         Ok(())
    ///     });
    /// assert!(builder.load_config().is_err());
    /// ```
    pub fn with_validation<F>(mut self, validator: F) -> Self
    where
        F: Fn(&InvalidatorConfig) -> std::result::Result<(), ValidationError>
            + Send
            + Sync
            + 'static,
    {
        self.validators.push(Arc::new(validator));
        self
    }

    /// Resolve and validate the settings without building a listener.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No settings or sources were provided
    /// - A source fails to load or deserialize
    /// - Validation fails
    pub fn load_config(self) -> Result<InvalidatorConfig> {
        let validators = self.validators;
        let config = match self.explicit {
            Some(config) => config,
            None => Self::into_loader(
                self.file_paths,
                self.custom_sources,
                self.env_prefix,
                self.env_separator,
            )?
            .load::<InvalidatorConfig>()?,
        };

        config.validate()?;
        for validator in &validators {
            validator(&config).map_err(|e| InvalidatorError::Validation(e.to_string()))?;
        }

        Ok(config)
    }

    /// Build a listener backed by Redis.
    ///
    /// # Errors
    ///
    /// See [`InvalidatorBuilder::load_config`].
    #[cfg(feature = "redis-transport")]
    pub fn build(self) -> Result<InvalidationListener<RedisConnector>> {
        let config = self.load_config()?;
        let connector = RedisConnector::new(&config);
        Ok(InvalidationListener::new(connector, config))
    }

    /// Build a listener on top of a custom transport.
    ///
    /// # Errors
    ///
    /// See [`InvalidatorBuilder::load_config`].
    pub fn build_with_connector<C: Connector>(
        self,
        connector: C,
    ) -> Result<InvalidationListener<C>> {
        let config = self.load_config()?;
        Ok(InvalidationListener::new(connector, config))
    }

    fn into_loader(
        file_paths: Vec<(PathBuf, bool)>,
        custom_sources: Vec<Box<dyn ConfigSource>>,
        env_prefix: Option<String>,
        env_separator: Option<String>,
    ) -> Result<ConfigLoader> {
        let mut loader = ConfigLoader::new();

        for (index, (path, required)) in file_paths.into_iter().enumerate() {
            let priority = 100 + (index as i32 * 10); // 100, 110, 120, etc.
            let mut source = FileSource::new(path).with_priority(priority);
            if !required {
                source = source.optional();
            }
            loader.add_source(Box::new(source));
        }

        for source in custom_sources {
            loader.add_source(source);
        }

        if let (Some(prefix), Some(separator)) = (env_prefix, env_separator) {
            loader.add_source(Box::new(EnvSource::new(prefix, separator)));
        }

        if loader.is_empty() {
            return Err(InvalidatorError::Config(
                "No settings provided: add a file, environment overrides, a source, or a config"
                    .to_string(),
            ));
        }

        Ok(loader)
    }
}

impl Default for InvalidatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
