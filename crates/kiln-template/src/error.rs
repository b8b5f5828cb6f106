//! Error types for template compilation and execution.

use thiserror::Error;

/// Errors raised while executing a compiled template.
///
/// Syntax problems are detected while compiling but are only reported when
/// the template is rendered.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    /// Malformed template or embedded code.
    #[error("syntax error: {0}")]
    Syntax(String),

    /// A name that is neither bound in the context nor declared in the template.
    #[error("reference error: {0} is not defined")]
    Reference(String),

    /// An operation applied to a value of the wrong kind.
    #[error("type error: {0}")]
    Type(String),
}

impl TemplateError {
    pub(crate) fn syntax(message: impl Into<String>) -> Self {
        Self::Syntax(message.into())
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }
}

/// Result type for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;
