//! Configuration loader that merges multiple sources.

use crate::error::{InvalidatorError, Result};
use crate::sources::ConfigSource;
use serde::de::DeserializeOwned;

/// Loads and merges configuration from multiple sources.
///
/// Sources are applied in priority order (lower priority first). Nested tables
/// are merged leaf by leaf, so a file can set `reconnect.max_backoff_ms` while
/// the environment overrides only `reconnect.max_attempts`.
pub struct ConfigLoader {
    sources: Vec<Box<dyn ConfigSource>>,
}

impl ConfigLoader {
    /// Create a new configuration loader.
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Add a configuration source.
    pub fn add_source(&mut self, source: Box<dyn ConfigSource>) {
        self.sources.push(source);
    }

    /// Whether any source has been added.
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Load and merge configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No sources were added
    /// - Any source fails to load
    /// - Deserialization fails
    pub fn load<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        if self.sources.is_empty() {
            return Err(InvalidatorError::Config(
                "No configuration sources specified".to_string(),
            ));
        }

        let mut builder = config::Config::builder();

        for source in self.sorted() {
            let values = source.load().map_err(|e| {
                InvalidatorError::Config(format!(
                    "Failed to load source '{}': {}",
                    source.name(),
                    e
                ))
            })?;

            let mut leaves = Vec::new();
            for (key, value) in values {
                flatten_into(key, value, &mut leaves);
            }

            for (key, value) in leaves {
                builder = builder.set_override(&key, value).map_err(|e| {
                    InvalidatorError::Config(format!(
                        "Failed to merge source '{}': {}",
                        source.name(),
                        e
                    ))
                })?;
            }

            tracing::debug!(source = %source.name(), "merged configuration source");
        }

        let config = builder.build().map_err(|e| {
            InvalidatorError::Config(format!("Failed to build configuration: {}", e))
        })?;

        config.try_deserialize::<T>().map_err(|e| {
            InvalidatorError::Deserialization(format!(
                "Failed to deserialize configuration: {}",
                e
            ))
        })
    }

    /// Get the list of source names in priority order.
    #[cfg(test)]
    pub fn source_names(&self) -> Vec<String> {
        self.sorted().iter().map(|s| s.name()).collect()
    }

    fn sorted(&self) -> Vec<&dyn ConfigSource> {
        let mut sorted: Vec<&dyn ConfigSource> = self.sources.iter().map(|s| s.as_ref()).collect();
        sorted.sort_by_key(|s| s.priority());
        sorted
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Expand nested tables into dotted `a.b.c` keys.
fn flatten_into(prefix: String, value: config::Value, out: &mut Vec<(String, config::Value)>) {
    match value.kind {
        config::ValueKind::Table(table) => {
            for (key, nested) in table {
                flatten_into(format!("{}.{}", prefix, key), nested, out);
            }
        }
        _ => out.push((prefix, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Nested {
        attempts: u32,
        backoff: u64,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct TestConfig {
        port: u16,
        host: String,
        nested: Nested,
    }

    struct MockSource {
        name: String,
        priority: i32,
        values: HashMap<String, config::Value>,
    }

    impl MockSource {
        fn new(name: &str, priority: i32) -> Self {
            Self {
                name: name.to_string(),
                priority,
                values: HashMap::new(),
            }
        }

        fn with_value(mut self, key: &str, value: impl Into<config::Value>) -> Self {
            self.values.insert(key.to_string(), value.into());
            self
        }
    }

    impl ConfigSource for MockSource {
        fn load(&self) -> Result<HashMap<String, config::Value>> {
            Ok(self.values.clone())
        }

        fn name(&self) -> String {
            self.name.clone()
        }

        fn priority(&self) -> i32 {
            self.priority
        }
    }

    fn table(entries: &[(&str, i64)]) -> config::Value {
        let map: config::Map<String, config::Value> = entries
            .iter()
            .map(|(k, v)| (k.to_string(), config::Value::from(*v)))
            .collect();
        config::Value::from(map)
    }

    #[test]
    fn test_empty_loader() {
        let loader = ConfigLoader::new();
        let result: Result<TestConfig> = loader.load();
        assert!(matches!(result, Err(InvalidatorError::Config(_))));
    }

    #[test]
    fn test_precedence_merges_nested_tables() {
        let mut loader = ConfigLoader::new();

        let defaults = MockSource::new("defaults", 100)
            .with_value("port", 6379i64)
            .with_value("host", "localhost")
            .with_value("nested", table(&[("attempts", 5), ("backoff", 1000)]));

        let overrides = MockSource::new("overrides", 300)
            .with_value("port", 6380i64)
            .with_value("nested", table(&[("attempts", 1)]));

        loader.add_source(Box::new(overrides));
        loader.add_source(Box::new(defaults));

        let config: TestConfig = loader.load().unwrap();
        assert_eq!(config.port, 6380);
        assert_eq!(config.host, "localhost");
        assert_eq!(
            config.nested,
            Nested {
                attempts: 1,
                backoff: 1000
            }
        );
    }

    #[test]
    fn test_missing_field_is_deserialization_error() {
        let mut loader = ConfigLoader::new();
        loader.add_source(Box::new(MockSource::new("partial", 100).with_value("port", 1i64)));

        let result: Result<TestConfig> = loader.load();
        assert!(matches!(result, Err(InvalidatorError::Deserialization(_))));
    }

    #[test]
    fn test_source_names() {
        let mut loader = ConfigLoader::new();
        loader.add_source(Box::new(MockSource::new("source1", 100)));
        loader.add_source(Box::new(MockSource::new("source2", 200)));
        loader.add_source(Box::new(MockSource::new("source3", 50)));

        assert_eq!(loader.source_names(), vec!["source3", "source1", "source2"]);
    }
}
