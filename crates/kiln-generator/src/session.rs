//! Per-build mutable state.
//!
//! A [`BuildSession`] is owned by the builder and borrowed by the renderer.
//! Every field is behind a lock so sibling subtrees can render in parallel.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fmt, fs,
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
};

use kiln_template::{Template, TemplateCompiler};
use tracing::{debug, warn};

/// Template names bound for page templates.
pub const TEMPLATE_BINDINGS: [&str; 5] =
    ["websiteSpecs", "themeSpecs", "items", "nodeSpecs", "breadCrumb"];

/// A problem with the site's content that does not stop the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    /// A node names a template the theme does not define.
    UnknownTemplate { node: String, template: String },

    /// A declared markdown source file does not exist.
    MissingMarkdown { node: String, path: PathBuf },

    /// A declared inline style file does not exist.
    MissingInlineStyle { node: String, path: PathBuf },

    /// A file resource has a category other than css, font, img or js.
    UnknownResourceCategory { path: PathBuf, category: Option<String> },

    /// A declared resource does not exist.
    MissingResource { path: PathBuf },

    /// An alias points at a page that was not built.
    AliasTargetMissing { alias: String, target: String },

    /// An alias path is empty or leaves the output directory.
    InvalidAliasPath { alias: String },

    /// A resource name or rename target is empty or leaves its directory.
    InvalidResourcePath { name: String },

    /// Two pages were written to the same file.
    DuplicateOutput { path: PathBuf },
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTemplate { node, template } => {
                write!(f, "`{node}` uses unknown template `{template}`")
            }
            Self::MissingMarkdown { node, path } => {
                write!(f, "`{node}` references missing markdown {}", path.display())
            }
            Self::MissingInlineStyle { node, path } => {
                write!(f, "`{node}` references missing inline style {}", path.display())
            }
            Self::UnknownResourceCategory { path, category } => write!(
                f,
                "resource {} has unknown category `{}`",
                path.display(),
                category.as_deref().unwrap_or("null")
            ),
            Self::MissingResource { path } => {
                write!(f, "resource {} does not exist", path.display())
            }
            Self::AliasTargetMissing { alias, target } => {
                write!(f, "alias `{alias}` points at {target}, which was not built")
            }
            Self::InvalidAliasPath { alias } => {
                write!(f, "alias `{alias}` is not a path inside the output directory")
            }
            Self::InvalidResourcePath { name } => {
                write!(f, "resource `{name}` is not a path inside its directory")
            }
            Self::DuplicateOutput { path } => {
                write!(f, "{} was written more than once", path.display())
            }
        }
    }
}

type TemplateSlot = Arc<Mutex<Option<Arc<Template>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Caches and registries shared by every render of one build.
pub struct BuildSession {
    compiler: TemplateCompiler,
    templates: Mutex<HashMap<String, TemplateSlot>>,
    compilations: AtomicUsize,
    stylesheets: Mutex<BTreeMap<String, String>>,
    written: Mutex<HashSet<PathBuf>>,
    inconsistencies: Mutex<Vec<Inconsistency>>,
}

impl Default for BuildSession {
    fn default() -> Self {
        Self::new(TemplateCompiler::with_bindings(TEMPLATE_BINDINGS))
    }
}

impl BuildSession {
    /// Create a session compiling templates with `compiler`.
    #[must_use]
    pub fn new(compiler: TemplateCompiler) -> Self {
        Self {
            compiler,
            templates: Mutex::default(),
            compilations: AtomicUsize::new(0),
            stylesheets: Mutex::default(),
            written: Mutex::default(),
            inconsistencies: Mutex::default(),
        }
    }

    /// The template cached under `name`, compiling `path` on first use.
    ///
    /// Concurrent first requests for one name compile it once; requests for
    /// other names are not blocked meanwhile. A failed read is not cached.
    pub fn template(&self, name: &str, path: &Path) -> std::io::Result<Arc<Template>> {
        let slot = Arc::clone(lock(&self.templates).entry(name.to_string()).or_default());
        let mut cached = lock(&*slot);
        if let Some(template) = cached.as_ref() {
            return Ok(Arc::clone(template));
        }

        let source = fs::read_to_string(path)?;
        let template = Arc::new(self.compiler.compile(&source));
        self.compilations.fetch_add(1, Ordering::Relaxed);
        debug!(template = name, path = %path.display(), "compiled template");

        *cached = Some(Arc::clone(&template));
        Ok(template)
    }

    /// How many templates were compiled so far.
    #[must_use]
    pub fn compilations(&self) -> usize {
        self.compilations.load(Ordering::Relaxed)
    }

    /// Register a stylesheet unless one with that name exists.
    ///
    /// `css` is only called when the name is new. Returns whether it was.
    pub fn register_stylesheet(&self, name: &str, css: impl FnOnce() -> String) -> bool {
        let mut stylesheets = lock(&self.stylesheets);
        if stylesheets.contains_key(name) {
            return false;
        }
        stylesheets.insert(name.to_string(), css());
        true
    }

    /// Snapshot of the registered stylesheets, by name.
    #[must_use]
    pub fn stylesheets(&self) -> BTreeMap<String, String> {
        lock(&self.stylesheets).clone()
    }

    /// Record that `path` is being written. Returns `false`, and reports a
    /// [`Inconsistency::DuplicateOutput`], if it was written before.
    pub fn claim_output(&self, path: &Path) -> bool {
        let fresh = lock(&self.written).insert(path.to_path_buf());
        if !fresh {
            self.report(Inconsistency::DuplicateOutput {
                path: path.to_path_buf(),
            });
        }
        fresh
    }

    /// Log an inconsistency and keep it for the build statistics.
    pub fn report(&self, inconsistency: Inconsistency) {
        warn!("{inconsistency}");
        lock(&self.inconsistencies).push(inconsistency);
    }

    /// The inconsistencies reported so far.
    #[must_use]
    pub fn inconsistencies(&self) -> Vec<Inconsistency> {
        lock(&self.inconsistencies).clone()
    }
}

impl fmt::Debug for BuildSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildSession")
            .field("compilations", &self.compilations())
            .field("stylesheets", &lock(&self.stylesheets).len())
            .field("written", &lock(&self.written).len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use kiln_template::Context;
    use rayon::prelude::*;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_template_compiled_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("default.ejs");
        fs::write(&path, "<p><%= nodeSpecs.title %></p>").unwrap();

        let session = BuildSession::default();
        let first = session.template("default", &path).unwrap();
        fs::write(&path, "changed").unwrap();
        let second = session.template("default", &path).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(session.compilations(), 1);

        let ctx = Context::new().with_var("nodeSpecs", serde_json::json!({"title": "Hi"}));
        assert_eq!(second.render(&ctx).unwrap(), "<p>Hi</p>");
    }

    #[test]
    fn test_template_compiled_once_under_contention() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("page.ejs");
        fs::write(&path, "page").unwrap();

        let session = BuildSession::default();
        (0..64).into_par_iter().for_each(|_| {
            session.template("page", &path).unwrap();
        });
        assert_eq!(session.compilations(), 1);
    }

    #[test]
    fn test_missing_template_is_not_cached() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("late.ejs");

        let session = BuildSession::default();
        assert!(session.template("late", &path).is_err());

        fs::write(&path, "ok").unwrap();
        assert!(session.template("late", &path).is_ok());
        assert_eq!(session.compilations(), 1);
    }

    #[test]
    fn test_stylesheet_registry() {
        let session = BuildSession::default();
        assert!(session.register_stylesheet("markdown", || "a{}".to_string()));
        assert!(!session.register_stylesheet("markdown", || unreachable!()));
        assert_eq!(session.stylesheets()["markdown"], "a{}");
    }

    #[test]
    fn test_duplicate_output_is_reported() {
        let session = BuildSession::default();
        let path = Path::new("out/blog/index.html");
        assert!(session.claim_output(path));
        assert!(!session.claim_output(path));
        assert_eq!(
            session.inconsistencies(),
            vec![Inconsistency::DuplicateOutput {
                path: path.to_path_buf()
            }]
        );
    }
}
