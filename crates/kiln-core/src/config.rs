//! Configuration file parsing.
//!
//! Specification files are JSON by default; a `.toml` file with the same stem
//! is accepted as an alternative.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
};

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{CoreError, Result};

/// Extensions tried, in order, when locating a configuration file by stem.
pub const CONFIG_EXTENSIONS: &[&str] = &["json", "toml"];

/// Reads structured configuration files.
pub trait ConfigParser: Send + Sync {
    /// Parse the file at `path` into an untyped document.
    ///
    /// Fails with [`CoreError::NotFound`] when the file is absent and
    /// [`CoreError::Malformed`] when it cannot be parsed.
    fn parse_value(&self, path: &Path) -> Result<serde_json::Value>;
}

/// Parse the file at `path` into `T`.
pub fn parse<T: DeserializeOwned>(parser: &dyn ConfigParser, path: &Path) -> Result<T> {
    let value = parser.parse_value(path)?;
    serde_json::from_value(value).map_err(|e| CoreError::malformed(path, e))
}

/// Find `<dir>/<stem>.json`, falling back to `<dir>/<stem>.toml`.
#[must_use]
pub fn find_config(dir: &Path, stem: &str) -> Option<PathBuf> {
    CONFIG_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{stem}.{ext}")))
        .find(|path| path.is_file())
}

/// Parser for JSON files, and TOML files by extension.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConfigParser;

impl ConfigParser for JsonConfigParser {
    fn parse_value(&self, path: &Path) -> Result<serde_json::Value> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => CoreError::NotFound {
                path: path.to_path_buf(),
            },
            _ => CoreError::Io(e),
        })?;

        debug!(path = %path.display(), "parsing configuration");

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            toml::from_str(&content).map_err(|e| CoreError::malformed(path, e))
        } else {
            serde_json::from_str(&content).map_err(|e| CoreError::malformed(path, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use tempfile::TempDir;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        #[serde(default)]
        count: u32,
    }

    #[test]
    fn test_parse_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("item.json");
        std::fs::write(&path, r#"{"name": "post", "count": 3}"#).unwrap();

        let sample: Sample = parse(&JsonConfigParser, &path).unwrap();
        assert_eq!(sample.name, "post");
        assert_eq!(sample.count, 3);
    }

    #[test]
    fn test_parse_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("item.toml");
        std::fs::write(&path, "name = \"post\"\n").unwrap();

        let sample: Sample = parse(&JsonConfigParser, &path).unwrap();
        assert_eq!(sample.name, "post");
        assert_eq!(sample.count, 0);
    }

    #[test]
    fn test_missing_and_malformed_are_distinct() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent.json");
        assert!(matches!(
            JsonConfigParser.parse_value(&missing),
            Err(CoreError::NotFound { .. })
        ));

        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "{ not json").unwrap();
        assert!(matches!(
            JsonConfigParser.parse_value(&broken),
            Err(CoreError::Malformed { .. })
        ));

        let wrong_shape = dir.path().join("shape.json");
        std::fs::write(&wrong_shape, r#"{"count": 1}"#).unwrap();
        assert!(matches!(
            parse::<Sample>(&JsonConfigParser, &wrong_shape),
            Err(CoreError::Malformed { .. })
        ));
    }

    #[test]
    fn test_find_config_prefers_json() {
        let dir = TempDir::new().unwrap();
        assert!(find_config(dir.path(), "item").is_none());

        std::fs::write(dir.path().join("item.toml"), "").unwrap();
        assert_eq!(
            find_config(dir.path(), "item"),
            Some(dir.path().join("item.toml"))
        );

        std::fs::write(dir.path().join("item.json"), "{}").unwrap();
        assert_eq!(
            find_config(dir.path(), "item"),
            Some(dir.path().join("item.json"))
        );
    }
}
