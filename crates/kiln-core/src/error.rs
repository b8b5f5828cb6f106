//! Error types for the kiln core library.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core error types for kiln.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A configuration file does not exist.
    #[error("Configuration file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// A configuration file exists but cannot be parsed.
    #[error("Malformed configuration in {}: {message}", path.display())]
    Malformed { path: PathBuf, message: String },

    /// A required top-level field is absent.
    #[error("No `{field}` specified in {}", path.display())]
    MissingField { path: PathBuf, field: &'static str },

    /// No theme directory holds the requested theme.
    #[error("Could not find the theme named `{name}`")]
    ThemeNotFound { name: String, searched: Vec<PathBuf> },

    /// The theme lacks a template every theme must provide.
    #[error("Theme `{theme}` must contain a `{template}` template")]
    MissingTemplate { theme: String, template: &'static str },

    /// File system I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    /// Create a new malformed-configuration error.
    pub fn malformed(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Malformed {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create a new missing-field error.
    pub fn missing_field(path: impl Into<PathBuf>, field: &'static str) -> Self {
        Self::MissingField {
            path: path.into(),
            field,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_field_error() {
        let err = CoreError::missing_field("site/website.json", "theme");
        assert!(err.to_string().contains("`theme`"));
        assert!(err.to_string().contains("site/website.json"));
    }

    #[test]
    fn test_malformed_error() {
        let err = CoreError::malformed("item.json", "expected value at line 1");
        assert!(err.to_string().contains("Malformed configuration"));
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: CoreError = io_err.into();
        assert!(err.to_string().contains("IO error"));
    }
}
