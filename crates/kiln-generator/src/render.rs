//! Rendering of individual content nodes.
//!
//! A node is rendered by resolving its template, turning its markdown sources
//! into HTML variables, running the template, post-processing the page and
//! copying the node's resources next to it.

use std::{
    fs,
    path::{Path, PathBuf},
};

use kiln_core::{ItemSpec, ThemeSpec, WebsiteSpec, path};
use kiln_markup::{HtmlPostProcessor, MarkdownRenderer, MarkupError, PostProcess};
use kiln_template::{Context, TemplateError, Value, convert_dates};
use thiserror::Error;
use tracing::debug;

use crate::{
    assets::{self, AssetError},
    session::{BuildSession, Inconsistency},
    tree::ContentTree,
};

/// Name under which the markdown highlighting stylesheet is registered.
pub const MARKDOWN_STYLESHEET: &str = "markdown";

/// Rendering errors.
#[derive(Debug, Error)]
pub enum RenderError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A template source file could not be read.
    #[error("cannot read template `{template}` from {}: {source}", path.display())]
    TemplateSource {
        template: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Template execution failed.
    #[error("template `{template}` failed for `{node}`: {source}")]
    Template {
        template: String,
        node: String,
        #[source]
        source: TemplateError,
    },

    /// Markdown or post-processing error.
    #[error(transparent)]
    Markup(#[from] MarkupError),

    /// Resource copy error.
    #[error(transparent)]
    Asset(#[from] AssetError),

    /// A specification could not be turned into template data.
    #[error("cannot serialize specification: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for rendering.
pub type Result<T> = std::result::Result<T, RenderError>;

/// What kind of page a node renders to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderTarget {
    /// A content page, written to `index.html` with the `default` template
    /// as fallback.
    Content,

    /// A standalone page such as the not-found page, written to
    /// `<name>.html` with the template of the same name as fallback.
    Singleton(String),
}

impl RenderTarget {
    /// A content page.
    #[must_use]
    pub fn content() -> Self {
        Self::Content
    }

    /// A standalone page named `name`.
    pub fn singleton(name: impl Into<String>) -> Self {
        Self::Singleton(name.into())
    }

    /// Output file name without the `.html` extension.
    #[must_use]
    pub fn file_stem(&self) -> &str {
        match self {
            Self::Content => "index",
            Self::Singleton(name) => name.as_str(),
        }
    }

    /// Template used when the node does not name one.
    #[must_use]
    pub fn fallback_template(&self) -> &str {
        match self {
            Self::Content => "default",
            Self::Singleton(name) => name.as_str(),
        }
    }
}

/// Site-wide inputs shared by every node.
#[derive(Debug, Clone, Copy)]
pub struct Site<'a> {
    /// Website root; node source paths are relative to it.
    pub website_dir: &'a Path,

    /// Base URL without a trailing slash.
    pub base_url: &'a str,

    /// Website specification, exposed to templates as `websiteSpecs`.
    pub website: &'a WebsiteSpec,

    /// Resolved theme, exposed as `themeSpecs`.
    pub theme: &'a ThemeSpec,

    /// Content tree, exposed as `items`.
    pub tree: &'a ContentTree,
}

/// Renders content nodes to HTML files.
pub struct NodeRenderer<'a> {
    website_dir: &'a Path,
    base_url: &'a str,
    theme: &'a ThemeSpec,
    session: &'a BuildSession,
    markdown: &'a dyn MarkdownRenderer,
    postprocessor: &'a dyn HtmlPostProcessor,
    website_value: Value,
    theme_value: Value,
    items_value: Value,
}

impl<'a> NodeRenderer<'a> {
    /// Create a renderer for `site`.
    ///
    /// The site, theme and tree projections given to templates are computed
    /// once here, with `…date` objects turned into calendar dates.
    pub fn new(
        site: Site<'a>,
        session: &'a BuildSession,
        markdown: &'a dyn MarkdownRenderer,
        postprocessor: &'a dyn HtmlPostProcessor,
    ) -> Result<Self> {
        Ok(Self {
            website_dir: site.website_dir,
            base_url: site.base_url,
            theme: site.theme,
            session,
            markdown,
            postprocessor,
            website_value: convert_dates(Value::from(serde_json::to_value(site.website)?)),
            theme_value: convert_dates(Value::from(serde_json::to_value(site.theme)?)),
            items_value: convert_dates(Value::from(site.tree.to_value()?)),
        })
    }

    /// Render one node.
    ///
    /// `source_base` is the node's source directory relative to the website
    /// root and `relative_url` its normalized URL below the site root. Returns
    /// the page's absolute URL, or `None` when the node has no specification
    /// or its template is unknown.
    pub fn render_node(
        &self,
        spec: Option<&ItemSpec>,
        source_base: &Path,
        output_dir: &Path,
        relative_url: &str,
        target: &RenderTarget,
    ) -> Result<Option<String>> {
        let Some(spec) = spec else {
            return Ok(None);
        };
        let node = if relative_url.is_empty() {
            target.file_stem()
        } else {
            relative_url
        };

        let template_name = spec
            .template
            .as_deref()
            .unwrap_or_else(|| target.fallback_template());
        let Some(template_path) = self.theme.template_path(template_name) else {
            self.session.report(Inconsistency::UnknownTemplate {
                node: node.to_string(),
                template: template_name.to_string(),
            });
            return Ok(None);
        };

        let source_dir = self.website_dir.join(source_base);
        let mut stylesheets = spec.extra_stylesheets.clone();
        let mut variables = spec.variables.clone();

        for (name, file) in &spec.markdowns {
            let path = source_dir.join(file);
            if path.is_file() {
                let html = self.markdown.render_to_html(&path)?;
                variables.insert(name.clone(), serde_json::Value::String(html));
            } else {
                self.session.report(Inconsistency::MissingMarkdown {
                    node: node.to_string(),
                    path,
                });
            }
        }
        if !spec.markdowns.is_empty() {
            self.session
                .register_stylesheet(MARKDOWN_STYLESHEET, || self.markdown.stylesheet());
            if !stylesheets.iter().any(|s| s == MARKDOWN_STYLESHEET) {
                stylesheets.push(MARKDOWN_STYLESHEET.to_string());
            }
        }

        let mut node_spec = serde_json::to_value(spec)?;
        if let Some(fields) = node_spec.as_object_mut() {
            fields.insert("template".to_string(), template_name.into());
            fields.insert("variables".to_string(), serde_json::Value::Object(variables));
        }

        let context = Context::new()
            .with_var("websiteSpecs", self.website_value.clone())
            .with_var("themeSpecs", self.theme_value.clone())
            .with_var("items", self.items_value.clone())
            .with_var("nodeSpecs", convert_dates(Value::from(node_spec)))
            .with_var(
                "breadCrumb",
                Value::array(path::bread_crumb(relative_url).into_iter().map(Value::from).collect()),
            );

        let template = self
            .session
            .template(template_name, &template_path)
            .map_err(|source| RenderError::TemplateSource {
                template: template_name.to_string(),
                path: template_path.clone(),
                source,
            })?;
        let html = template
            .render(&context)
            .map_err(|source| RenderError::Template {
                template: template_name.to_string(),
                node: node.to_string(),
                source,
            })?;

        let inline_style = match &spec.inline_styles {
            Some(file) => {
                let path = source_dir.join(file);
                if path.is_file() {
                    Some(fs::read_to_string(&path)?)
                } else {
                    self.session.report(Inconsistency::MissingInlineStyle {
                        node: node.to_string(),
                        path,
                    });
                    None
                }
            }
            None => None,
        };
        let page = self.postprocessor.process(
            &html,
            &PostProcess {
                stylesheets,
                inline_style,
            },
        )?;

        assets::ensure_dir(output_dir)?;
        let file = output_dir.join(format!("{}.html", target.file_stem()));
        self.session.claim_output(&file);
        fs::write(&file, page)?;
        debug!(node, template = template_name, path = %file.display(), "rendered page");

        assets::copy_resources(&spec.resources, &source_dir, output_dir, self.session)?;

        Ok(Some(path::absolute_url(self.base_url, relative_url)))
    }
}

#[cfg(test)]
mod tests {
    use kiln_core::JsonConfigParser;
    use kiln_markup::{PulldownMarkdown, RewritingPostProcessor};
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    struct Fixture {
        dir: TempDir,
        website: WebsiteSpec,
        theme: ThemeSpec,
        tree: ContentTree,
    }

    fn fixture(templates: &[(&str, &str)]) -> Fixture {
        let dir = TempDir::new().unwrap();
        let theme_dir = dir.path().join("theme");
        fs::create_dir_all(&theme_dir).unwrap();
        let mut entries = serde_json::Map::new();
        for (name, source) in templates {
            let file = format!("{name}.ejs");
            fs::write(theme_dir.join(&file), source).unwrap();
            entries.insert(name.to_string(), json!(file));
        }
        let mut theme: ThemeSpec = serde_json::from_value(json!({"templates": entries})).unwrap();
        theme.base_path = theme_dir;

        let website: WebsiteSpec = serde_json::from_value(json!({
            "theme": "plain",
            "mainPage": {},
            "404": {},
            "contents": "content",
            "title": "My Site"
        }))
        .unwrap();

        let post = dir.path().join("content/blog/post");
        fs::create_dir_all(&post).unwrap();
        fs::write(post.join("body.md"), "# Hello\n\nText").unwrap();
        fs::write(post.join("style.css"), "main {\n  color: red;\n}\n").unwrap();
        fs::create_dir_all(post.join("images")).unwrap();
        fs::write(post.join("images/a.png"), "png").unwrap();
        let tree = ContentTree::gather(&dir.path().join("content"), &JsonConfigParser).unwrap();

        Fixture {
            dir,
            website,
            theme,
            tree,
        }
    }

    fn render(
        fx: &Fixture,
        session: &BuildSession,
        spec: serde_json::Value,
        relative_url: &str,
        target: &RenderTarget,
    ) -> Result<Option<String>> {
        let spec: ItemSpec = serde_json::from_value(spec).unwrap();
        let markdown = PulldownMarkdown::new();
        let postprocessor = RewritingPostProcessor::new();
        let site = Site {
            website_dir: fx.dir.path(),
            base_url: "https://example.com",
            website: &fx.website,
            theme: &fx.theme,
            tree: &fx.tree,
        };
        let renderer = NodeRenderer::new(site, session, &markdown, &postprocessor)?;
        let source = Path::new("content").join(relative_url);
        let output = fx.dir.path().join("out").join(relative_url);
        renderer.render_node(Some(&spec), &source, &output, relative_url, target)
    }

    const PAGE: &str = "<html><head><title><%= websiteSpecs.title %></title></head><body><%- nodeSpecs.variables.body %><p><%= breadCrumb.join('>') %></p></body></html>";

    #[test]
    fn test_render_content_node() {
        let fx = fixture(&[("default", PAGE), ("404", "missing")]);
        let session = BuildSession::default();

        let url = render(
            &fx,
            &session,
            json!({
                "markdowns": {"body": "body.md"},
                "extraStylesheets": ["site"],
                "inlineStyles": "style.css",
                "resources": {"images": null}
            }),
            "blog/post",
            &RenderTarget::content(),
        )
        .unwrap();
        assert_eq!(url.as_deref(), Some("https://example.com/blog/post"));

        let out = fx.dir.path().join("out/blog/post");
        let html = fs::read_to_string(out.join("index.html")).unwrap();
        assert!(html.contains("<title>My Site</title>"));
        assert!(html.contains("<h1>Hello</h1>"));
        assert!(html.contains("<p>blog&gt;post</p>"));
        assert!(html.contains(
            "<link rel=\"stylesheet\" href=\"/css/site.css\"><link rel=\"stylesheet\" href=\"/css/markdown.css\"><style>main{color:red}</style></head>"
        ));
        assert!(out.join("images/a.png").is_file());

        assert!(session.stylesheets().contains_key(MARKDOWN_STYLESHEET));
        assert!(session.inconsistencies().is_empty());
    }

    #[test]
    fn test_date_fields_get_calendar_methods() {
        let fx = fixture(&[
            (
                "default",
                "<p><%= nodeSpecs.variables.publishDate.toShortFormJalali() %></p>",
            ),
            ("404", "missing"),
        ]);
        let session = BuildSession::default();

        render(
            &fx,
            &session,
            json!({"variables": {"publishDate": {"year": 1401, "month": 11, "day": 22}}}),
            "blog/post",
            &RenderTarget::content(),
        )
        .unwrap();

        let html = fs::read_to_string(fx.dir.path().join("out/blog/post/index.html")).unwrap();
        assert_eq!(html, "<p>۱۴۰۱/۱۱/۲۲</p>");
    }

    #[test]
    fn test_unknown_template_skips_node() {
        let fx = fixture(&[("default", PAGE), ("404", "missing")]);
        let session = BuildSession::default();

        let url = render(&fx, &session, json!({"template": "gallery"}), "blog/post", &RenderTarget::content())
            .unwrap();
        assert!(url.is_none());
        assert!(!fx.dir.path().join("out/blog/post/index.html").exists());
        assert!(matches!(
            &session.inconsistencies()[..],
            [Inconsistency::UnknownTemplate { template, .. }] if template == "gallery"
        ));
    }

    #[test]
    fn test_node_without_spec_is_skipped() {
        let fx = fixture(&[("default", PAGE), ("404", "missing")]);
        let session = BuildSession::default();
        let markdown = PulldownMarkdown::new();
        let postprocessor = RewritingPostProcessor::new();
        let site = Site {
            website_dir: fx.dir.path(),
            base_url: "https://example.com",
            website: &fx.website,
            theme: &fx.theme,
            tree: &fx.tree,
        };
        let renderer = NodeRenderer::new(site, &session, &markdown, &postprocessor).unwrap();
        let out = fx.dir.path().join("out");
        let url = renderer
            .render_node(None, Path::new("content/blog"), &out, "blog", &RenderTarget::content())
            .unwrap();
        assert!(url.is_none());
        assert!(!out.exists());
    }

    #[test]
    fn test_singleton_uses_own_template() {
        let fx = fixture(&[("default", PAGE), ("404", "<p>not found: <%= breadCrumb.length %></p>")]);
        let session = BuildSession::default();

        let url = render(&fx, &session, json!({}), "", &RenderTarget::singleton("404")).unwrap();
        assert_eq!(url.as_deref(), Some("https://example.com/"));
        assert_eq!(
            fs::read_to_string(fx.dir.path().join("out/404.html")).unwrap(),
            "<p>not found: 0</p>"
        );
    }

    #[test]
    fn test_missing_markdown_is_reported() {
        let fx = fixture(&[("default", "[<%= nodeSpecs.variables.intro %>]"), ("404", "")]);
        let session = BuildSession::default();

        let url = render(
            &fx,
            &session,
            json!({"markdowns": {"intro": "nope.md"}, "inlineStyles": "nope.css"}),
            "blog/post",
            &RenderTarget::content(),
        )
        .unwrap();
        assert!(url.is_some());
        assert_eq!(
            fs::read_to_string(fx.dir.path().join("out/blog/post/index.html")).unwrap(),
            "[]"
        );

        let reported = session.inconsistencies();
        assert!(matches!(reported[0], Inconsistency::MissingMarkdown { .. }));
        assert!(matches!(reported[1], Inconsistency::MissingInlineStyle { .. }));
    }

    #[test]
    fn test_template_errors_are_fatal() {
        let fx = fixture(&[("default", "<%= nodeSpecs.missing.deeper %>"), ("404", "")]);
        let session = BuildSession::default();

        let err = render(&fx, &session, json!({}), "blog/post", &RenderTarget::content()).unwrap_err();
        assert!(matches!(
            err,
            RenderError::Template { source: TemplateError::Type(_), .. }
        ));
    }

    #[test]
    fn test_render_target() {
        assert_eq!(RenderTarget::content().file_stem(), "index");
        assert_eq!(RenderTarget::content().fallback_template(), "default");
        let not_found = RenderTarget::singleton("404");
        assert_eq!(not_found.file_stem(), "404");
        assert_eq!(not_found.fallback_template(), "404");
    }
}
