//! Syntax highlighting for code blocks.
//!
//! Code is highlighted with CSS classes rather than inline colours, so one
//! shared stylesheet serves every page.

use syntect::{
    highlighting::ThemeSet,
    html::{ClassStyle, ClassedHTMLGenerator, css_for_theme_with_class_style},
    parsing::SyntaxSet,
    util::LinesWithEndings,
};
use tracing::warn;

const CLASS_STYLE: ClassStyle = ClassStyle::Spaced;

/// Syntax highlighter using syntect.
#[derive(Debug)]
pub struct SyntaxHighlighter {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
    theme: String,
}

impl Default for SyntaxHighlighter {
    fn default() -> Self {
        Self::new("InspiredGitHub")
    }
}

impl SyntaxHighlighter {
    /// Create a new syntax highlighter whose stylesheet uses `theme`.
    pub fn new(theme: &str) -> Self {
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme_set: ThemeSet::load_defaults(),
            theme: theme.to_string(),
        }
    }

    /// Get available theme names.
    pub fn available_themes(&self) -> Vec<&str> {
        self.theme_set.themes.keys().map(String::as_str).collect()
    }

    /// Highlight code with the given language.
    ///
    /// Unknown languages are rendered as plain escaped text in the same
    /// `<pre class="code">` wrapper.
    pub fn highlight(&self, code: &str, lang: Option<&str>) -> String {
        let syntax = lang
            .and_then(|l| self.syntax_set.find_syntax_by_token(l))
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text());

        let mut generator =
            ClassedHTMLGenerator::new_with_class_style(syntax, &self.syntax_set, CLASS_STYLE);
        for line in LinesWithEndings::from(code) {
            if let Err(e) = generator.parse_html_for_line_which_includes_newline(line) {
                warn!(error = %e, "syntax highlighting failed, emitting plain code");
                return wrap(&html_escape(code), lang);
            }
        }
        wrap(&generator.finalize(), lang)
    }

    /// CSS rules for the highlighting classes.
    pub fn stylesheet(&self) -> String {
        let theme = self
            .theme_set
            .themes
            .get(&self.theme)
            .or_else(|| self.theme_set.themes.values().next());
        let Some(theme) = theme else {
            return String::new();
        };
        css_for_theme_with_class_style(theme, CLASS_STYLE).unwrap_or_else(|e| {
            warn!(error = %e, theme = %self.theme, "failed to build highlighting stylesheet");
            String::new()
        })
    }

    /// Set the stylesheet theme, if it exists.
    pub fn set_theme(&mut self, theme: &str) {
        if self.theme_set.themes.contains_key(theme) {
            self.theme = theme.to_string();
        }
    }
}

fn wrap(body: &str, lang: Option<&str>) -> String {
    let lang_class = lang
        .map(|l| format!(" class=\"language-{}\"", html_escape(l)))
        .unwrap_or_default();
    format!("<pre class=\"code\"><code{lang_class}>{body}</code></pre>\n")
}

/// Escape HTML special characters.
pub(crate) fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highlight_rust() {
        let highlighter = SyntaxHighlighter::default();
        let html = highlighter.highlight("fn main() {}\n", Some("rust"));

        assert!(html.starts_with("<pre class=\"code\"><code class=\"language-rust\">"));
        assert!(html.contains("<span class="));
        assert!(html.contains("main"));
    }

    #[test]
    fn test_highlight_unknown_language() {
        let highlighter = SyntaxHighlighter::default();
        let html = highlighter.highlight("a < b", Some("unknown_lang_xyz"));

        assert!(html.contains("a &lt; b"));
    }

    #[test]
    fn test_stylesheet_is_stable() {
        let highlighter = SyntaxHighlighter::default();
        let css = highlighter.stylesheet();

        assert!(!css.is_empty());
        assert_eq!(css, highlighter.stylesheet());
    }

    #[test]
    fn test_set_theme_ignores_unknown() {
        let mut highlighter = SyntaxHighlighter::default();
        highlighter.set_theme("no-such-theme");
        assert_eq!(highlighter.theme, "InspiredGitHub");
        assert!(highlighter.available_themes().contains(&"InspiredGitHub"));
    }
}
