//! Listener settings.

use crate::core::{ConfigLoader, Validate};
use crate::error::{Result, ValidationError};
use crate::notify::KeyspacePattern;
use crate::sources::EnvSource;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

fn default_key_pattern() -> String {
    "*".to_string()
}

fn default_notify_keyspace_events() -> String {
    "KEA".to_string()
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

/// Connection and subscription settings for an invalidation listener.
///
/// Usually loaded through [`InvalidatorBuilder`](crate::core::InvalidatorBuilder)
/// or [`InvalidatorConfig::from_env`], but can be constructed directly.
///
/// # Examples
///
/// ```rust
/// use keyspace_invalidator::core::InvalidatorConfig;
///
/// let config = InvalidatorConfig::new("127.0.0.1", 6379)
///     .with_password("s3cret")
///     .with_key_pattern("session:*");
/// assert_eq!(config.pattern().as_str(), "__keyspace@0__:session:*");
/// ```
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct InvalidatorConfig {
    /// Store hostname.
    pub host: String,
    /// Store port.
    pub port: u16,
    /// Password used to authenticate, if any. `REDIS_PASS` maps here.
    #[serde(default)]
    pub password: Option<String>,
    /// ACL username, if any.
    #[serde(default)]
    pub username: Option<String>,
    /// Logical database whose keyspace events are subscribed to.
    #[serde(default)]
    pub database: i64,
    /// Key glob appended to the keyspace channel prefix.
    #[serde(default = "default_key_pattern")]
    pub key_pattern: String,
    /// Flags passed to `CONFIG SET notify-keyspace-events`.
    #[serde(default = "default_notify_keyspace_events")]
    pub notify_keyspace_events: String,
    /// Whether to enable keyspace notifications on the server before subscribing.
    ///
    /// Managed deployments often reject `CONFIG`; turn this off there and
    /// enable notifications out of band.
    #[serde(default = "default_true")]
    pub configure_notifications: bool,
    /// Timeout for connecting and subscribing, in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Reconnect policy after mid-stream failures.
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl InvalidatorConfig {
    /// Create settings for the given host and port with all other fields defaulted.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            password: None,
            username: None,
            database: 0,
            key_pattern: default_key_pattern(),
            notify_keyspace_events: default_notify_keyspace_events(),
            configure_notifications: true,
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Load settings from `REDIS_*` environment variables and validate them.
    ///
    /// `REDIS_HOST` and `REDIS_PORT` are required; `REDIS_PASS` is optional.
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing, cannot be parsed,
    /// or fail validation.
    pub fn from_env() -> Result<Self> {
        let mut loader = ConfigLoader::new();
        loader.add_source(Box::new(EnvSource::redis()));
        let config: Self = loader.load()?;
        config.validate()?;
        Ok(config)
    }

    /// Set the authentication password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the ACL username.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the logical database.
    pub fn with_database(mut self, database: i64) -> Self {
        self.database = database;
        self
    }

    /// Set the key glob to subscribe to (default `*`).
    pub fn with_key_pattern(mut self, key_pattern: impl Into<String>) -> Self {
        self.key_pattern = key_pattern.into();
        self
    }

    /// Set the `notify-keyspace-events` flags (default `KEA`).
    pub fn with_notify_keyspace_events(mut self, flags: impl Into<String>) -> Self {
        self.notify_keyspace_events = flags.into();
        self
    }

    /// Enable or disable `CONFIG SET notify-keyspace-events` before subscribing.
    pub fn with_configure_notifications(mut self, enabled: bool) -> Self {
        self.configure_notifications = enabled;
        self
    }

    /// Set the connect/subscribe timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the reconnect policy.
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// The pattern subscription these settings describe.
    pub fn pattern(&self) -> KeyspacePattern {
        KeyspacePattern::new(self.database, &self.key_pattern)
    }

    /// Connect/subscribe timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl fmt::Debug for InvalidatorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InvalidatorConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("username", &self.username)
            .field("database", &self.database)
            .field("key_pattern", &self.key_pattern)
            .field("notify_keyspace_events", &self.notify_keyspace_events)
            .field("configure_notifications", &self.configure_notifications)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("reconnect", &self.reconnect)
            .finish()
    }
}

impl Validate for InvalidatorConfig {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        let mut errors = Vec::new();

        if self.host.trim().is_empty() {
            errors.push(ValidationError::invalid_field("host", "must not be empty"));
        }
        if self.port == 0 {
            errors.push(ValidationError::invalid_field("port", "must be non-zero"));
        }
        if self.database < 0 {
            errors.push(ValidationError::invalid_field("database", "must not be negative"));
        }
        if self.key_pattern.is_empty() {
            errors.push(ValidationError::invalid_field("key_pattern", "must not be empty"));
        }
        if self.configure_notifications && self.notify_keyspace_events.is_empty() {
            errors.push(ValidationError::invalid_field(
                "notify_keyspace_events",
                "must not be empty when configure_notifications is enabled",
            ));
        }
        if self.connect_timeout_ms == 0 {
            errors.push(ValidationError::invalid_field(
                "connect_timeout_ms",
                "must be greater than 0",
            ));
        }
        if let Err(e) = self.reconnect.validate() {
            errors.push(e);
        }

        ValidationError::from_list(errors)
    }
}

/// Bounded exponential backoff applied after mid-stream transport failures.
///
/// The initial subscription is never retried; only a subscription that was
/// established and then lost is.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Consecutive failed resubscriptions tolerated before giving up. 0 disables reconnecting.
    pub max_attempts: u32,
    /// Delay before the first reconnect attempt, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound for the doubled delay, in milliseconds.
    pub max_backoff_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
        }
    }
}

impl ReconnectConfig {
    /// Never reconnect: the first transport error ends the listener.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Self::default()
        }
    }

    /// Set the attempt limit.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set the initial and maximum backoff.
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff_ms = initial.as_millis() as u64;
        self.max_backoff_ms = max.as_millis() as u64;
        self
    }

    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self
            .initial_backoff_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }
}

impl Validate for ReconnectConfig {
    fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.initial_backoff_ms == 0 {
            return Err(ValidationError::invalid_field(
                "reconnect.initial_backoff_ms",
                "must be greater than 0",
            ));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ValidationError::invalid_field(
                "reconnect.max_backoff_ms",
                "must be >= reconnect.initial_backoff_ms",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = InvalidatorConfig::new("localhost", 6379);
        assert_eq!(config.database, 0);
        assert_eq!(config.key_pattern, "*");
        assert_eq!(config.notify_keyspace_events, "KEA");
        assert!(config.configure_notifications);
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.reconnect, ReconnectConfig::default());
        assert_eq!(config.pattern().as_str(), "__keyspace@0__:*");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = InvalidatorConfig::new("localhost", 6379).with_password("hunter2");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = InvalidatorConfig::new("  ", 0).with_database(-1);
        config.key_pattern.clear();

        match config.validate() {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 4),
            other => panic!("expected multiple errors, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_connect_timeout_rejected() {
        let config = InvalidatorConfig::new("localhost", 6379).with_connect_timeout(Duration::ZERO);
        assert_eq!(
            config.validate(),
            Err(ValidationError::invalid_field(
                "connect_timeout_ms",
                "must be greater than 0"
            ))
        );
    }

    #[test]
    fn test_empty_flags_allowed_when_not_configuring() {
        let config = InvalidatorConfig::new("localhost", 6379)
            .with_notify_keyspace_events("")
            .with_configure_notifications(false);
        assert!(config.validate().is_ok());

        let config = config.with_configure_notifications(true);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let reconnect = ReconnectConfig::default()
            .with_backoff(Duration::from_millis(100), Duration::from_millis(500));

        assert_eq!(reconnect.backoff_for(1), Duration::from_millis(100));
        assert_eq!(reconnect.backoff_for(2), Duration::from_millis(200));
        assert_eq!(reconnect.backoff_for(3), Duration::from_millis(400));
        assert_eq!(reconnect.backoff_for(4), Duration::from_millis(500));
        assert_eq!(reconnect.backoff_for(100), Duration::from_millis(500));
    }

    #[test]
    fn test_reconnect_validation() {
        let zero = ReconnectConfig::default().with_backoff(Duration::ZERO, Duration::from_secs(1));
        assert!(zero.validate().is_err());

        let inverted =
            ReconnectConfig::default().with_backoff(Duration::from_secs(2), Duration::from_secs(1));
        assert!(inverted.validate().is_err());

        assert!(ReconnectConfig::disabled().validate().is_ok());
    }
}
