//! Website, theme and item specifications.
//!
//! Field names follow the camelCase keys of the specification files. Keys a
//! type does not know about are kept in `extra` so templates still see them.

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{
    config::{self, ConfigParser, find_config},
    error::{CoreError, Result},
};

/// Stem of the website specification file.
pub const WEBSITE_FILE: &str = "website";
/// Stem of the theme specification file.
pub const THEME_FILE: &str = "theme";
/// Stem of a content node's specification file.
pub const ITEM_FILE: &str = "item";

/// Templates every theme must define.
pub const REQUIRED_TEMPLATES: [&str; 2] = ["default", "404"];

/// Output category of a file resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceCategory {
    Css,
    Font,
    Img,
    Js,
}

impl ResourceCategory {
    /// Parse a category name. Only the four known kinds are accepted.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "css" => Some(Self::Css),
            "font" => Some(Self::Font),
            "img" => Some(Self::Img),
            "js" => Some(Self::Js),
            _ => None,
        }
    }

    /// Directory name used in the output tree.
    #[must_use]
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Css => "css",
            Self::Font => "font",
            Self::Img => "img",
            Self::Js => "js",
        }
    }
}

impl fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Resource map: source name to file category, or to a new directory name
/// (`null` keeps the original name).
pub type Resources = BTreeMap<String, Option<String>>;

/// Per-node specification (`item.json`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSpec {
    /// Theme template used to render the node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Stylesheet names linked from the page.
    #[serde(default)]
    pub extra_stylesheets: Vec<String>,

    /// Template variable name to markdown source file.
    #[serde(default)]
    pub markdowns: BTreeMap<String, String>,

    /// CSS file inlined into the page head.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_styles: Option<String>,

    /// Resources copied next to the rendered page.
    #[serde(default)]
    pub resources: Resources,

    /// Free-form template variables.
    #[serde(default)]
    pub variables: Map<String, Value>,

    /// Any other keys.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ItemSpec {
    /// Whether `name` is claimed as a resource rather than content.
    #[must_use]
    pub fn claims_resource(&self, name: &str) -> bool {
        self.resources.contains_key(name)
    }
}

/// A page rendered outside the content tree (main page, not-found page).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSpec {
    /// Source directory relative to the website root.
    #[serde(default = "default_base_path")]
    pub base_path: String,

    #[serde(flatten)]
    pub item: ItemSpec,
}

fn default_base_path() -> String {
    ".".to_string()
}

impl Default for PageSpec {
    fn default() -> Self {
        Self {
            base_path: default_base_path(),
            item: ItemSpec::default(),
        }
    }
}

/// Top-level website specification (`website.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebsiteSpec {
    /// Theme name.
    pub theme: String,

    /// Main page, rendered to `index.html`.
    pub main_page: PageSpec,

    /// Not-found page, rendered to `404.html`.
    #[serde(rename = "404")]
    pub not_found: PageSpec,

    /// Content root relative to the website root.
    pub contents: String,

    /// Stylesheet name to CSS file, written to `css/<name>.css`.
    #[serde(default, alias = "additional_stylesheets")]
    pub additional_stylesheets: BTreeMap<String, String>,

    /// Alias path to target URL.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,

    /// Search-engine verification token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_verification: Option<String>,

    /// User agent to ordered `[name, value]` rules.
    #[serde(default)]
    pub robots: BTreeMap<String, Vec<(String, String)>>,

    /// Resources copied into the output root.
    #[serde(default)]
    pub resources: Resources,

    /// Any other keys.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl WebsiteSpec {
    /// Fields that must be present, in the order they are checked.
    pub const REQUIRED_FIELDS: [&'static str; 4] = ["theme", "mainPage", "404", "contents"];

    /// Locate and load the specification in a website directory.
    pub fn load_from_dir(website_dir: &Path, parser: &dyn ConfigParser) -> Result<Self> {
        let path = find_config(website_dir, WEBSITE_FILE)
            .unwrap_or_else(|| website_dir.join(format!("{WEBSITE_FILE}.json")));
        Self::load(&path, parser)
    }

    /// Load and validate a website specification.
    ///
    /// Each absent required field is reported as its own error.
    pub fn load(path: &Path, parser: &dyn ConfigParser) -> Result<Self> {
        let value = parser.parse_value(path)?;
        let Value::Object(fields) = &value else {
            return Err(CoreError::malformed(path, "expected an object at top level"));
        };
        for field in Self::REQUIRED_FIELDS {
            if !fields.contains_key(field) {
                return Err(CoreError::missing_field(path, field));
            }
        }
        let spec: Self = serde_json::from_value(value).map_err(|e| CoreError::malformed(path, e))?;
        debug!(theme = %spec.theme, contents = %spec.contents, "loaded website specification");
        Ok(spec)
    }
}

/// A resolved theme (`theme.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeSpec {
    /// Template name to source path relative to the theme directory.
    #[serde(default)]
    pub templates: BTreeMap<String, String>,

    /// Resources copied into the output root.
    #[serde(default)]
    pub resources: Resources,

    /// Directory the theme was loaded from.
    #[serde(default, skip_deserializing)]
    pub base_path: PathBuf,

    /// Any other keys.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ThemeSpec {
    /// Default theme search path: the website's own `themes` directory, then
    /// `~/.kiln/themes`.
    #[must_use]
    pub fn default_search_dirs(website_dir: &Path) -> Vec<PathBuf> {
        let mut search = vec![website_dir.join("themes")];
        if let Some(home) = dirs::home_dir() {
            search.push(home.join(".kiln").join("themes"));
        }
        search
    }

    /// Find `name` in the search directories and load it. The first match wins.
    pub fn resolve(name: &str, search_dirs: &[PathBuf], parser: &dyn ConfigParser) -> Result<Self> {
        for dir in search_dirs {
            let base = dir.join(name);
            if let Some(path) = find_config(&base, THEME_FILE) {
                let mut theme: Self = config::parse(parser, &path)?;
                theme.base_path = base;
                theme.validate(name)?;
                debug!(theme = name, dir = %theme.base_path.display(), "resolved theme");
                return Ok(theme);
            }
        }
        Err(CoreError::ThemeNotFound {
            name: name.to_string(),
            searched: search_dirs.to_vec(),
        })
    }

    fn validate(&self, name: &str) -> Result<()> {
        for template in REQUIRED_TEMPLATES {
            if !self.templates.contains_key(template) {
                return Err(CoreError::MissingTemplate {
                    theme: name.to_string(),
                    template,
                });
            }
        }
        Ok(())
    }

    /// Absolute path of a template source, if the theme defines it.
    #[must_use]
    pub fn template_path(&self, name: &str) -> Option<PathBuf> {
        self.templates.get(name).map(|file| self.base_path.join(file))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;
    use crate::config::JsonConfigParser;

    fn write(dir: &Path, name: &str, value: &Value) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
        path
    }

    fn website_json() -> Value {
        json!({
            "theme": "plain",
            "mainPage": {"markdowns": {"body": "index.md"}},
            "404": {"basePath": "errors"},
            "contents": "content",
            "additional_stylesheets": {"site": "site.css"},
            "robots": {"*": [["Disallow", "/drafts"]]},
            "author": "Ada"
        })
    }

    #[test]
    fn test_load_website() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "website.json", &website_json());

        let spec = WebsiteSpec::load_from_dir(dir.path(), &JsonConfigParser).unwrap();
        assert_eq!(spec.theme, "plain");
        assert_eq!(spec.main_page.base_path, ".");
        assert_eq!(spec.not_found.base_path, "errors");
        assert_eq!(spec.main_page.item.markdowns["body"], "index.md");
        assert_eq!(spec.additional_stylesheets["site"], "site.css");
        assert_eq!(
            spec.robots["*"],
            vec![("Disallow".to_string(), "/drafts".to_string())]
        );
        assert_eq!(spec.extra["author"], json!("Ada"));
    }

    #[test]
    fn test_missing_fields_are_distinct() {
        let dir = TempDir::new().unwrap();
        for field in WebsiteSpec::REQUIRED_FIELDS {
            let mut value = website_json();
            value.as_object_mut().unwrap().remove(field);
            let path = write(dir.path(), "website.json", &value);

            match WebsiteSpec::load(&path, &JsonConfigParser) {
                Err(CoreError::MissingField { field: missing, .. }) => assert_eq!(missing, field),
                other => panic!("expected missing {field}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_missing_website_file() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            WebsiteSpec::load_from_dir(dir.path(), &JsonConfigParser),
            Err(CoreError::NotFound { .. })
        ));
    }

    #[test]
    fn test_item_spec_keeps_unknown_fields() {
        let item: ItemSpec = serde_json::from_value(json!({
            "template": "post",
            "extraStylesheets": ["./local"],
            "resources": {"images": "img", "gallery": null, "files": "downloads"},
            "variables": {"title": "Hello"},
            "date": "2024-01-01"
        }))
        .unwrap();

        assert_eq!(item.template.as_deref(), Some("post"));
        assert!(item.claims_resource("gallery"));
        assert_eq!(item.resources["gallery"], None);
        assert_eq!(item.extra["date"], json!("2024-01-01"));

        let back = serde_json::to_value(&item).unwrap();
        assert_eq!(back["variables"]["title"], json!("Hello"));
        assert_eq!(back["date"], json!("2024-01-01"));
        assert_eq!(back["extraStylesheets"], json!(["./local"]));
    }

    #[test]
    fn test_resource_category() {
        assert_eq!(ResourceCategory::parse("img"), Some(ResourceCategory::Img));
        assert_eq!(ResourceCategory::parse("video"), None);
        assert_eq!(ResourceCategory::Font.to_string(), "font");
    }

    #[test]
    fn test_resolve_theme() {
        let site = TempDir::new().unwrap();
        let global = TempDir::new().unwrap();
        let theme_dir = global.path().join("plain");
        std::fs::create_dir_all(&theme_dir).unwrap();
        write(
            &theme_dir,
            "theme.json",
            &json!({"templates": {"default": "default.ejs", "404": "404.ejs"}}),
        );

        let search = vec![site.path().join("themes"), global.path().to_path_buf()];
        let theme = ThemeSpec::resolve("plain", &search, &JsonConfigParser).unwrap();
        assert_eq!(theme.base_path, theme_dir);
        assert_eq!(
            theme.template_path("default"),
            Some(theme_dir.join("default.ejs"))
        );

        assert!(matches!(
            ThemeSpec::resolve("fancy", &search, &JsonConfigParser),
            Err(CoreError::ThemeNotFound { .. })
        ));
    }

    #[test]
    fn test_local_theme_wins_and_requires_templates() {
        let site = TempDir::new().unwrap();
        let local = site.path().join("themes").join("plain");
        std::fs::create_dir_all(&local).unwrap();
        write(&local, "theme.json", &json!({"templates": {"default": "d.ejs"}}));

        let search = ThemeSpec::default_search_dirs(site.path());
        assert!(matches!(
            ThemeSpec::resolve("plain", &search, &JsonConfigParser),
            Err(CoreError::MissingTemplate { template: "404", .. })
        ));
    }
}
