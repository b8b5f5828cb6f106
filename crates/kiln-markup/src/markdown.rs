//! Markdown rendering using pulldown-cmark.

use std::path::Path;

use pulldown_cmark::{CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd, html};

use crate::{
    error::{MarkupError, Result},
    syntax::SyntaxHighlighter,
};

/// Converts markdown source files to HTML.
pub trait MarkdownRenderer: Send + Sync {
    /// Render the markdown file at `path`.
    fn render_to_html(&self, path: &Path) -> Result<String>;

    /// Stylesheet for the markup produced by [`Self::render_to_html`].
    ///
    /// Independent of content.
    fn stylesheet(&self) -> String;
}

/// Markdown renderer with class-based syntax highlighting.
///
/// TeX between `$…$` or `$$…$$` is passed through untouched for client-side
/// math rendering.
#[derive(Debug)]
pub struct PulldownMarkdown {
    highlighter: SyntaxHighlighter,
    options: Options,
}

impl Default for PulldownMarkdown {
    fn default() -> Self {
        Self::new()
    }
}

impl PulldownMarkdown {
    /// Create a new renderer with default options.
    pub fn new() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_MATH);

        Self {
            highlighter: SyntaxHighlighter::default(),
            options,
        }
    }

    /// Create a renderer whose stylesheet uses a custom syntax theme.
    pub fn with_theme(theme: &str) -> Self {
        let mut renderer = Self::new();
        renderer.highlighter.set_theme(theme);
        renderer
    }

    /// Render markdown source text.
    pub fn render_str(&self, content: &str) -> String {
        let mut events = Vec::new();
        let mut code_block: Option<(Option<String>, String)> = None;

        for event in Parser::new_ext(content, self.options) {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let lang = match kind {
                        CodeBlockKind::Fenced(info) => info
                            .split_whitespace()
                            .next()
                            .map(str::to_string),
                        CodeBlockKind::Indented => None,
                    };
                    code_block = Some((lang, String::new()));
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((lang, code)) = code_block.take() {
                        let highlighted = self.highlighter.highlight(&code, lang.as_deref());
                        events.push(Event::Html(CowStr::from(highlighted)));
                    }
                }
                Event::Text(text) if code_block.is_some() => {
                    if let Some((_, code)) = code_block.as_mut() {
                        code.push_str(&text);
                    }
                }
                Event::InlineMath(tex) => {
                    events.push(Event::Text(CowStr::from(format!("${tex}$"))));
                }
                Event::DisplayMath(tex) => {
                    events.push(Event::Text(CowStr::from(format!("$${tex}$$"))));
                }
                other => events.push(other),
            }
        }

        let mut out = String::with_capacity(content.len() * 3 / 2);
        html::push_html(&mut out, events.into_iter());
        out
    }
}

impl MarkdownRenderer for PulldownMarkdown {
    fn render_to_html(&self, path: &Path) -> Result<String> {
        let content = std::fs::read_to_string(path).map_err(|source| MarkupError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(self.render_str(&content))
    }

    fn stylesheet(&self) -> String {
        self.highlighter.stylesheet()
    }
}
