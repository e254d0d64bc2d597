//! Configuration source trait.

use crate::error::Result;
use std::collections::HashMap;

/// Trait for configuration sources.
///
/// Implement this trait to feed listener settings from somewhere other than
/// files or the process environment (a secrets store, a test fixture, ...).
pub trait ConfigSource: Send + Sync {
    /// Load configuration as a raw key-value map.
    ///
    /// Nested tables are merged key by key with other sources according to
    /// precedence rules.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot be loaded or parsed.
    fn load(&self) -> Result<HashMap<String, config::Value>>;

    /// Get a human-readable name for this source (for logging/debugging).
    fn name(&self) -> String;

    /// Get the priority of this source (higher = takes precedence).
    ///
    /// Default priorities:
    /// - Environment variables: 300
    /// - Files: 100, 110, 120, ... in the order they were added
    fn priority(&self) -> i32 {
        100
    }
}
