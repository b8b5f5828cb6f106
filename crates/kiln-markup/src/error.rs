//! Error types for markup processing.

use std::path::PathBuf;

use thiserror::Error;

/// Markup processing errors.
#[derive(Debug, Error)]
pub enum MarkupError {
    /// A source file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The HTML rewriter rejected the document.
    #[error("html rewriting failed: {0}")]
    Rewrite(String),
}

/// Result type for markup operations.
pub type Result<T> = std::result::Result<T, MarkupError>;
