//! Kiln Markup Library
//!
//! The collaborators a page passes through after its template has run:
//! markdown conversion with syntax highlighting, script and style
//! minification, and HTML post-processing.

pub mod error;
pub mod markdown;
pub mod minify;
pub mod postprocess;
pub mod syntax;

pub use error::{MarkupError, Result};
pub use markdown::{MarkdownRenderer, PulldownMarkdown};
pub use minify::{LightMinifier, Minifier};
pub use postprocess::{HtmlPostProcessor, PostProcess, RewritingPostProcessor, stylesheet_href};
pub use syntax::SyntaxHighlighter;
