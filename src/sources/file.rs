//! File-based configuration source.

use super::ConfigSource;
use crate::error::{InvalidatorError, Result};
use config::File;
use std::collections::HashMap;
use std::path::PathBuf;

/// File-based configuration source.
///
/// Loads listener settings from YAML, TOML, or JSON files with the format
/// detected from the file extension.
///
/// # Examples
///
/// ```rust,no_run
/// use keyspace_invalidator::sources::FileSource;
///
/// let source = FileSource::new("config/invalidator.yaml");
/// ```
pub struct FileSource {
    path: PathBuf,
    priority: i32,
    required: bool,
}

impl FileSource {
    /// Create a new file source.
    ///
    /// - `.yaml`, `.yml` -> YAML
    /// - `.toml` -> TOML
    /// - `.json` -> JSON
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            priority: 100,
            required: true,
        }
    }

    /// Set the priority for this source.
    ///
    /// Higher priority sources override lower priority ones.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Treat a missing file as empty instead of an error.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    fn validate_extension(&self) -> Result<()> {
        let extension = self
            .path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| {
                InvalidatorError::Config(format!(
                    "Unable to determine file format for: {}",
                    self.path.display()
                ))
            })?;

        match extension {
            "yaml" | "yml" | "toml" | "json" => Ok(()),
            _ => Err(InvalidatorError::Config(format!(
                "Unsupported file extension: {}. Supported: .yaml, .yml, .toml, .json",
                extension
            ))),
        }
    }
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<HashMap<String, config::Value>> {
        self.validate_extension()?;

        if !self.path.exists() {
            if self.required {
                return Err(InvalidatorError::Config(format!(
                    "Configuration file not found: {}",
                    self.path.display()
                )));
            }
            return Ok(HashMap::new());
        }

        let config_builder = config::Config::builder()
            .add_source(File::from(self.path.clone()).required(true))
            .build()
            .map_err(|e| InvalidatorError::Config(format!("Failed to load file: {}", e)))?;

        let map = config_builder
            .try_deserialize::<HashMap<String, config::Value>>()
            .map_err(|e| {
                InvalidatorError::Deserialization(format!("Failed to parse file: {}", e))
            })?;

        Ok(map)
    }

    fn name(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_validate_extension() {
        for name in ["a.yaml", "a.yml", "a.toml", "a.json"] {
            assert!(FileSource::new(name).validate_extension().is_ok(), "{name}");
        }
        assert!(FileSource::new("a.txt").validate_extension().is_err());
        assert!(FileSource::new("noext").validate_extension().is_err());
    }

    #[test]
    fn test_load_toml_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("invalidator.toml");

        fs::write(
            &config_path,
            r#"
host = "localhost"
port = 6379

[reconnect]
max_attempts = 3
"#,
        )
        .unwrap();

        let map = FileSource::new(&config_path).load().unwrap();
        assert_eq!(map["host"].clone().into_string().unwrap(), "localhost");
        assert_eq!(map["port"].clone().into_int().unwrap(), 6379);
        assert!(map.contains_key("reconnect"));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let source = FileSource::new("/nonexistent/invalidator.yaml");
        assert!(matches!(source.load(), Err(InvalidatorError::Config(_))));
    }

    #[test]
    fn test_optional_missing_file_is_empty() {
        let source = FileSource::new("/nonexistent/invalidator.yaml").optional();
        assert!(source.load().unwrap().is_empty());
    }

    #[test]
    fn test_with_priority_and_name() {
        let source = FileSource::new("invalidator.yaml").with_priority(200);
        assert_eq!(source.priority(), 200);
        assert!(source.name().contains("invalidator.yaml"));
    }
}
