//! Compiler for `<% %>` page templates.
//!
//! Templates mix literal HTML with directives:
//!
//! - `<%= expr %>` writes the HTML-escaped value of `expr`
//! - `<%- expr %>` writes the value unescaped
//! - `<% code %>` runs statements (`if`, `for`, declarations, ...)
//! - `<%# note %>` is a comment
//!
//! A leading `_` on a directive trims whitespace before it; a trailing `-`
//! or `_` trims newlines or all whitespace after it.
//!
//! ```
//! use kiln_template::{Context, TemplateCompiler, Value};
//!
//! let compiler = TemplateCompiler::with_bindings(["title", "tags"]);
//! let template = compiler.compile("<h1><%= title %></h1><% for (const t of tags) { %>#<%= t %> <% } %>");
//!
//! let ctx = Context::new()
//!     .with_var("title", "Fish & Chips")
//!     .with_var("tags", Value::array(vec!["food".into(), "uk".into()]));
//! assert_eq!(
//!     template.render(&ctx).unwrap(),
//!     "<h1>Fish &amp; Chips</h1>#food #uk "
//! );
//! ```

mod ast;
mod builtins;
mod compile;
mod date;
mod error;
mod lexer;
mod parser;
mod value;

use std::{collections::HashMap, fmt};

use tracing::debug;

pub use builtins::escape_html;
pub use date::{JalaliDate, convert_dates, to_persian_digits};
pub use error::{Result, TemplateError};
pub use value::Value;

use crate::compile::{Program, Scope};

/// Values handed to a template when it is rendered.
#[derive(Debug, Clone, Default)]
pub struct Context {
    variables: HashMap<String, Value>,
}

impl Context {
    /// Create a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a variable into the context.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.variables.insert(key.into(), value.into());
    }

    /// Builder-style [`Context::insert`].
    #[must_use]
    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Get a variable value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }

    /// Check if a variable exists.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.variables.contains_key(key)
    }
}

/// Compiles template source into [`Template`]s.
///
/// The compiler optionally carries a fixed list of binding names. When set,
/// exactly those names are visible to template code, and any of them missing
/// from the render context is `undefined`. Without it every context variable
/// is visible.
#[derive(Debug, Clone, Default)]
pub struct TemplateCompiler {
    bindings: Option<Vec<String>>,
}

impl TemplateCompiler {
    /// A compiler that exposes every context variable.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A compiler that exposes exactly `names`.
    pub fn with_bindings<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bindings: Some(names.into_iter().map(Into::into).collect()),
        }
    }

    /// The declared binding names, if any.
    #[must_use]
    pub fn bindings(&self) -> Option<&[String]> {
        self.bindings.as_deref()
    }

    /// Compile template source.
    ///
    /// Never fails: syntax errors are kept and reported by
    /// [`Template::render`].
    #[must_use]
    pub fn compile(&self, source: &str) -> Template {
        let program = lexer::scan(source)
            .and_then(parser::parse_template)
            .map(Program::compile);
        if let Err(err) = &program {
            debug!(error = %err, "template has syntax errors");
        }
        Template {
            program,
            bindings: self.bindings.clone(),
        }
    }
}

/// Compile `source` with a default [`TemplateCompiler`].
#[must_use]
pub fn compile(source: &str) -> Template {
    TemplateCompiler::new().compile(source)
}

/// A compiled template.
pub struct Template {
    program: std::result::Result<Program, TemplateError>,
    bindings: Option<Vec<String>>,
}

impl Template {
    /// Render the template against a context.
    pub fn render(&self, context: &Context) -> Result<String> {
        let program = self.program.as_ref().map_err(Clone::clone)?;
        let globals = match &self.bindings {
            Some(names) => names
                .iter()
                .map(|name| (name.clone(), context.get(name).cloned().unwrap_or_default()))
                .collect(),
            None => context.variables.clone(),
        };
        program.run(&mut Scope::new(globals))
    }

    /// Whether any directive writes HTML-escaped output.
    #[must_use]
    pub fn has_escaped_output(&self) -> bool {
        self.program.as_ref().is_ok_and(Program::escapes)
    }

    /// The syntax error that [`Template::render`] will report, if any.
    #[must_use]
    pub fn compile_error(&self) -> Option<&TemplateError> {
        self.program.as_ref().err()
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("ok", &self.program.is_ok())
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn render(source: &str, ctx: &Context) -> String {
        compile(source).render(ctx).unwrap()
    }

    #[test]
    fn test_literal_text_is_identity() {
        let source = "<html>\n  <body>\"quotes\" & 'apostrophes' \\ ${not} `code`</body>\n</html>\n";
        assert_eq!(render(source, &Context::new()), source);
        assert_eq!(render("", &Context::new()), "");
    }

    #[test]
    fn test_escaped_and_raw_output() {
        let ctx = Context::new().with_var("s", "<b>\"x\" & 'y'</b>");
        assert_eq!(
            render("<%= s %>", &ctx),
            "&lt;b&gt;&quot;x&quot; &amp; &apos;y&apos;&lt;/b&gt;"
        );
        assert_eq!(render("<%- s %>", &ctx), "<b>\"x\" & 'y'</b>");
    }

    #[test]
    fn test_trim_modifiers() {
        let ctx = Context::new();
        assert_eq!(render("A\n<%_ x = 1 -%>\nB", &ctx), "AB");
        assert_eq!(render("A\n<% x = 1 %>\nB", &ctx), "A\n\nB");
    }

    #[test]
    fn test_comment_directive() {
        assert_eq!(render("a<%# ignored %>b", &Context::new()), "ab");
    }

    #[test]
    fn test_bindings_default_to_undefined() {
        let compiler = TemplateCompiler::with_bindings(["title", "extra"]);
        let template = compiler.compile("[<%= title %>][<%= extra %>]");
        let ctx = Context::new().with_var("title", "T").with_var("hidden", "H");
        assert_eq!(template.render(&ctx).unwrap(), "[T][]");

        let template = compiler.compile("<%= hidden %>");
        assert_eq!(
            template.render(&ctx).unwrap_err(),
            TemplateError::Reference("hidden".into())
        );
    }

    #[test]
    fn test_syntax_errors_are_deferred() {
        let template = compile("before <%= oops");
        assert!(template.compile_error().is_some());
        assert!(matches!(
            template.render(&Context::new()),
            Err(TemplateError::Syntax(_))
        ));

        let template = compile("<% if (x) { %>never closed");
        assert!(template.render(&Context::new()).is_err());
    }

    #[test]
    fn test_compile_is_idempotent() {
        let source = "<% for (const item of items) { %><li><%= item.name %></li><% } %>";
        let ctx = Context::new().with_var(
            "items",
            Value::from(json!([{"name": "a"}, {"name": "<b>"}])),
        );
        let first = compile(source).render(&ctx).unwrap();
        let second = compile(source).render(&ctx).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, "<li>a</li><li>&lt;b&gt;</li>");
    }

    #[test]
    fn test_escape_helper_presence() {
        assert!(compile("<%= x %>").has_escaped_output());
        assert!(compile("<% if (a) { %><%= x %><% } %>").has_escaped_output());
        assert!(!compile("<%- x %> text").has_escaped_output());
    }

    #[test]
    fn test_rendering_a_page() {
        let source = r#"<nav><%- breadCrumb.map(p => escapeForHtml(p)).join(" / ") %></nav>
<% const children = Object.keys(items.children || {}); _%>
<ul>
<% for (const name of children) { -%>
  <li class="<%= name === nodeSpecs.variables.current ? 'active' : '' %>"><%= name.toUpperCase() %></li>
<% } -%>
</ul>"#;
        let ctx = Context::new()
            .with_var("breadCrumb", Value::from(json!(["blog", "a<b"])))
            .with_var(
                "items",
                Value::from(json!({"children": {"blog": {}, "about": {}}})),
            )
            .with_var("nodeSpecs", Value::from(json!({"variables": {"current": "blog"}})));
        let html = render(source, &ctx);
        assert!(html.starts_with("<nav>blog / a&lt;b</nav>\n<ul>\n"));
        assert!(html.contains("  <li class=\"\">ABOUT</li>\n"));
        assert!(html.contains("  <li class=\"active\">BLOG</li>\n"));
        assert!(html.ends_with("</ul>"));
    }

    #[test]
    fn test_template_strings() {
        let ctx = Context::new()
            .with_var("name", "<Ann>")
            .with_var("tags", Value::from(json!(["a", "b"])));
        assert_eq!(
            render("<%= `Hi ${name}, ${tags.length} tags: ${tags.join('|')}` %>", &ctx),
            "Hi &lt;Ann&gt;, 2 tags: a|b"
        );
        assert_eq!(render("<%- `${1 + 2}${missing}` %>", &Context::new().with_var("missing", Value::Undefined)), "3undefined");
        assert_eq!(render("<% const s = `x\\n` %><%= s.length %>", &ctx), "2");
    }

    #[test]
    fn test_dates_in_template_data() {
        let source = "<%= post.publishDate.toShortFormJalali() %>|<%- post.publishDate.toLongFormJalali() %>|<%= post.publishDate.compare(post.editDate) %>|<%= post.publishDate.year %>";
        let post = convert_dates(Value::from(json!({
            "post": {
                "publishDate": {"year": 1402, "month": 5, "day": 3},
                "editDate": {"year": 1402, "month": 6, "day": 1}
            }
        })));
        let ctx = Context::new().with_var("post", post.field("post").cloned().unwrap_or_default());
        assert_eq!(
            render(source, &ctx),
            "۱۴۰۲/۵/۳|سوم مرداد ماه ۱۴۰۲|-1|1402"
        );

        // Without conversion the data is a plain object.
        let raw = Context::new().with_var("d", Value::from(json!({"year": 1402})));
        assert!(compile("<%= d.toShortFormJalali() %>").render(&raw).is_err());
    }

    #[test]
    fn test_template_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Template>();
    }
}
