//! HTML post-processing of rendered pages.
//!
//! Pages are streamed through `lol_html`, so markup the processor does not
//! touch is emitted byte for byte and the output is deterministic.

use std::cell::{Cell, RefCell};

use lol_html::{
    RewriteStrSettings, element,
    html_content::{ContentType, TextChunk},
    rewrite_str, text,
};
use tracing::warn;

use crate::{
    error::{MarkupError, Result},
    minify::{LightMinifier, Minifier},
    syntax::html_escape,
};

/// What to add to a page besides minifying its inline code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostProcess {
    /// Stylesheet names to link, see [`stylesheet_href`].
    pub stylesheets: Vec<String>,
    /// Raw CSS inlined into the head after minification.
    pub inline_style: Option<String>,
}

/// Link target for a stylesheet name.
///
/// Names starting with `./` refer to a `css` directory next to the page.
///
/// ```
/// use kiln_markup::stylesheet_href;
///
/// assert_eq!(stylesheet_href("markdown"), "/css/markdown.css");
/// assert_eq!(stylesheet_href("./local"), "./css/local.css");
/// ```
#[must_use]
pub fn stylesheet_href(name: &str) -> String {
    match name.strip_prefix("./") {
        Some(rest) => format!("./css/{rest}.css"),
        None => format!("/css/{name}.css"),
    }
}

/// Final pass over a rendered page.
pub trait HtmlPostProcessor: Send + Sync {
    /// Minify inline scripts and styles, add the requested stylesheets, and
    /// serialize the document.
    fn process(&self, html: &str, job: &PostProcess) -> Result<Vec<u8>>;
}

/// Streaming post-processor built on `lol_html`.
#[derive(Debug, Clone, Default)]
pub struct RewritingPostProcessor<M = LightMinifier> {
    minifier: M,
}

impl RewritingPostProcessor {
    /// Create a post-processor using [`LightMinifier`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_minifier(LightMinifier)
    }
}

impl<M: Minifier> RewritingPostProcessor<M> {
    /// Create a post-processor with a custom minifier.
    pub fn with_minifier(minifier: M) -> Self {
        Self { minifier }
    }

    fn head_markup(&self, job: &PostProcess) -> String {
        let mut markup = String::new();
        for name in &job.stylesheets {
            markup.push_str(&format!(
                "<link rel=\"stylesheet\" href=\"{}\">",
                html_escape(&stylesheet_href(name))
            ));
        }
        if let Some(css) = &job.inline_style {
            markup.push_str("<style>");
            markup.push_str(&self.minifier.minify_style(css));
            markup.push_str("</style>");
        }
        markup
    }
}

fn is_script_type(kind: &str) -> bool {
    matches!(
        kind.trim().to_ascii_lowercase().as_str(),
        "" | "javascript"
            | "text/javascript"
            | "application/javascript"
            | "text/ecmascript"
            | "application/ecmascript"
            | "module"
    )
}

fn is_style_type(kind: &str) -> bool {
    matches!(kind.trim().to_ascii_lowercase().as_str(), "" | "text/css")
}

/// Text of one element can arrive in several chunks; collect them and write
/// the minified whole in place of the last one.
fn minify_chunk(chunk: &mut TextChunk<'_>, buffer: &RefCell<String>, minify: impl Fn(&str) -> String) {
    buffer.borrow_mut().push_str(chunk.as_str());
    if chunk.last_in_text_node() {
        let source = std::mem::take(&mut *buffer.borrow_mut());
        chunk.replace(&minify(&source), ContentType::Html);
    } else {
        chunk.remove();
    }
}

impl<M: Minifier> HtmlPostProcessor for RewritingPostProcessor<M> {
    fn process(&self, html: &str, job: &PostProcess) -> Result<Vec<u8>> {
        let head_markup = self.head_markup(job);
        let head_seen = Cell::new(false);
        let script_is_js = Cell::new(false);
        let style_is_css = Cell::new(false);
        let script_text = RefCell::new(String::new());
        let style_text = RefCell::new(String::new());

        let output = rewrite_str(
            html,
            RewriteStrSettings {
                element_content_handlers: vec![
                    element!("script", |el| {
                        script_is_js.set(el.get_attribute("type").is_none_or(|t| is_script_type(&t)));
                        Ok(())
                    }),
                    text!("script", |chunk| {
                        if script_is_js.get() {
                            minify_chunk(chunk, &script_text, |s| self.minifier.minify_script(s));
                        }
                        Ok(())
                    }),
                    element!("style", |el| {
                        style_is_css.set(el.get_attribute("type").is_none_or(|t| is_style_type(&t)));
                        Ok(())
                    }),
                    text!("style", |chunk| {
                        if style_is_css.get() {
                            minify_chunk(chunk, &style_text, |s| self.minifier.minify_style(s));
                        }
                        Ok(())
                    }),
                    element!("head", |el| {
                        head_seen.set(true);
                        if !head_markup.is_empty() {
                            el.append(&head_markup, ContentType::Html);
                        }
                        Ok(())
                    }),
                ],
                ..RewriteStrSettings::new()
            },
        )
        .map_err(|e| MarkupError::Rewrite(e.to_string()))?;

        if !head_seen.get() && !head_markup.is_empty() {
            warn!("page has no <head>; stylesheets were not added");
        }

        Ok(output.into_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(html: &str, job: &PostProcess) -> String {
        let bytes = RewritingPostProcessor::new().process(html, job).unwrap();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_untouched_markup_is_preserved() {
        let html = "<!DOCTYPE html>\n<html><head><title>T</title></head><body><p class=x>Hi &amp; bye</p></body></html>";
        assert_eq!(process(html, &PostProcess::default()), html);
    }

    #[test]
    fn test_minifies_inline_code() {
        let html = "<head><script>\n  // note\n  let a = 1;\n</script><style>\n  p {  color: red; }\n</style></head>";
        let out = process(html, &PostProcess::default());
        assert_eq!(
            out,
            "<head><script>let a = 1;</script><style>p{color:red}</style></head>"
        );
    }

    #[test]
    fn test_skips_non_code_types() {
        let html = "<script type=\"application/ld+json\">\n  {\"a\": 1}\n</script><style type=\"text/less\">\n a { }\n</style>";
        assert_eq!(process(html, &PostProcess::default()), html);

        let module = "<script type=\"module\">\n  import x from './x.js'\n</script>";
        assert_eq!(
            process(module, &PostProcess::default()),
            "<script type=\"module\">import x from './x.js'</script>"
        );
    }

    #[test]
    fn test_appends_stylesheets_and_inline_style() {
        let job = PostProcess {
            stylesheets: vec!["markdown".into(), "./local".into()],
            inline_style: Some("body {\n  margin: 0;\n}\n".into()),
        };
        let out = process("<html><head><title>T</title></head><body></body></html>", &job);
        assert_eq!(
            out,
            "<html><head><title>T</title><link rel=\"stylesheet\" href=\"/css/markdown.css\"><link rel=\"stylesheet\" href=\"./css/local.css\"><style>body{margin:0}</style></head><body></body></html>"
        );
    }

    #[test]
    fn test_output_is_deterministic() {
        let job = PostProcess {
            stylesheets: vec!["site".into()],
            inline_style: None,
        };
        let html = "<html><head><script>var x = 1</script></head></html>";
        assert_eq!(process(html, &job), process(html, &job));
    }
}
