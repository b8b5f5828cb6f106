//! Build orchestration.
//!
//! Coordinates the full site build process.

use std::{
    collections::{BTreeMap, HashSet},
    fmt, fs,
    path::{Path, PathBuf},
    time::Instant,
};

use kiln_core::{
    ConfigParser, CoreError, JsonConfigParser, ThemeSpec, WebsiteSpec,
    path::{is_contained, join_url, normalize_url},
};
use kiln_markup::{
    HtmlPostProcessor, LightMinifier, MarkdownRenderer, Minifier, PulldownMarkdown,
    RewritingPostProcessor,
};
use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
    alias::AliasGenerator,
    assets::{self, AssetError},
    render::{NodeRenderer, RenderError, RenderTarget, Site},
    robots::RobotsGenerator,
    session::{BuildSession, Inconsistency},
    sitemap::SitemapGenerator,
    tree::{ContentTree, NodeId, TreeError},
};

/// Build errors.
#[derive(Debug, Error)]
pub enum BuildError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Website or theme specification error.
    #[error(transparent)]
    Config(#[from] CoreError),

    /// Content tree error.
    #[error("content error: {0}")]
    Tree(#[from] TreeError),

    /// Page rendering error.
    #[error("render error: {0}")]
    Render(#[from] RenderError),

    /// Asset error.
    #[error("asset error: {0}")]
    Asset(#[from] AssetError),

    /// A configured stylesheet could not be read.
    #[error("cannot read stylesheet `{name}` from {}: {source}", path.display())]
    Stylesheet {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// How content nodes are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BuildMode {
    /// Depth-first, one node at a time.
    #[default]
    Sequential,

    /// Sibling subtrees render in parallel on the rayon thread pool.
    Parallel,
}

/// Build statistics.
#[derive(Debug, Clone, Default)]
pub struct BuildStats {
    /// Number of pages generated, singleton pages included.
    pub pages: usize,

    /// Number of alias redirect pages generated.
    pub aliases: usize,

    /// Number of resources copied into the output root.
    pub resources: usize,

    /// Number of consolidated stylesheets written.
    pub stylesheets: usize,

    /// URLs of the rendered content pages, as listed in the sitemap.
    pub urls: Vec<String>,

    /// Problems that did not stop the build.
    pub inconsistencies: Vec<Inconsistency>,

    /// Build duration in milliseconds.
    pub duration_ms: u64,
}

/// Site builder that orchestrates the build process.
pub struct Builder {
    website_dir: PathBuf,
    output_dir: PathBuf,
    base_url: String,
    theme_dirs: Option<Vec<PathBuf>>,
    mode: BuildMode,
    parser: Box<dyn ConfigParser>,
    markdown: Box<dyn MarkdownRenderer>,
    postprocessor: Box<dyn HtmlPostProcessor>,
    minifier: Box<dyn Minifier>,
}

impl fmt::Debug for Builder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("website_dir", &self.website_dir)
            .field("output_dir", &self.output_dir)
            .field("base_url", &self.base_url)
            .field("theme_dirs", &self.theme_dirs)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Builder {
    /// Create a new builder. A trailing slash on `base_url` is dropped.
    #[must_use]
    pub fn new(
        website_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            website_dir: website_dir.into(),
            output_dir: output_dir.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            theme_dirs: None,
            mode: BuildMode::default(),
            parser: Box::new(JsonConfigParser),
            markdown: Box::new(PulldownMarkdown::new()),
            postprocessor: Box::new(RewritingPostProcessor::new()),
            minifier: Box::new(LightMinifier),
        }
    }

    /// Search these directories for the theme instead of the defaults.
    #[must_use]
    pub fn with_theme_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.theme_dirs = Some(dirs);
        self
    }

    /// Set the build mode.
    #[must_use]
    pub fn with_mode(mut self, mode: BuildMode) -> Self {
        self.mode = mode;
        self
    }

    /// Use a different configuration parser.
    #[must_use]
    pub fn with_config_parser(mut self, parser: impl ConfigParser + 'static) -> Self {
        self.parser = Box::new(parser);
        self
    }

    /// Use a different markdown renderer.
    #[must_use]
    pub fn with_markdown(mut self, markdown: impl MarkdownRenderer + 'static) -> Self {
        self.markdown = Box::new(markdown);
        self
    }

    /// Use a different page post-processor.
    #[must_use]
    pub fn with_postprocessor(mut self, postprocessor: impl HtmlPostProcessor + 'static) -> Self {
        self.postprocessor = Box::new(postprocessor);
        self
    }

    /// Use a different minifier for consolidated stylesheets.
    #[must_use]
    pub fn with_minifier(mut self, minifier: impl Minifier + 'static) -> Self {
        self.minifier = Box::new(minifier);
        self
    }

    /// Execute the full build process.
    ///
    /// Everything that can make the build fail before rendering (the website
    /// specification, the theme, configured stylesheets and item files) is
    /// checked before anything is written.
    pub fn build(&self) -> Result<BuildStats> {
        let start = Instant::now();
        let mut stats = BuildStats::default();

        info!(
            website = %self.website_dir.display(),
            output = %self.output_dir.display(),
            "starting build"
        );

        // 1. Load specifications
        let website = WebsiteSpec::load_from_dir(&self.website_dir, self.parser.as_ref())?;
        let search_dirs = self
            .theme_dirs
            .clone()
            .unwrap_or_else(|| ThemeSpec::default_search_dirs(&self.website_dir));
        let theme = ThemeSpec::resolve(&website.theme, &search_dirs, self.parser.as_ref())?;
        let stylesheets = self.read_stylesheets(&website)?;

        // 2. Gather content
        let content_base = PathBuf::from(&website.contents);
        let tree = ContentTree::gather(&self.website_dir.join(&content_base), self.parser.as_ref())?;

        let session = BuildSession::default();
        for (name, css) in stylesheets {
            session.register_stylesheet(&name, || css);
        }
        let site = Site {
            website_dir: &self.website_dir,
            base_url: &self.base_url,
            website: &website,
            theme: &theme,
            tree: &tree,
        };
        let renderer = NodeRenderer::new(
            site,
            &session,
            self.markdown.as_ref(),
            self.postprocessor.as_ref(),
        )?;

        // 3. Render the content tree
        assets::ensure_dir(&self.output_dir)?;
        stats.urls = self.walk(&renderer, &tree, tree.root(), content_base, String::new())?;
        stats.pages = stats.urls.len();

        // 4. Copy top-level resources
        stats.resources += assets::copy_resources(
            &theme.resources,
            &theme.base_path,
            &self.output_dir,
            &session,
        )?;
        stats.resources += assets::copy_resources(
            &website.resources,
            &self.website_dir,
            &self.output_dir,
            &session,
        )?;

        // 5. Sitemap and verification file
        let sitemap = SitemapGenerator::new(&self.base_url);
        sitemap.write(&self.output_dir, &stats.urls)?;
        if let Some(token) = &website.google_verification {
            self.write_verification(token)?;
        }

        // 6. Alias redirects
        let built: HashSet<&str> = stats.urls.iter().map(String::as_str).collect();
        stats.aliases =
            AliasGenerator::new().generate(&website.aliases, &built, &self.output_dir, &session)?;

        // 7. Main and not-found pages
        for (page, target) in [
            (&website.main_page, RenderTarget::content()),
            (&website.not_found, RenderTarget::singleton("404")),
        ] {
            let rendered = renderer.render_node(
                Some(&page.item),
                Path::new(&page.base_path),
                &self.output_dir,
                "",
                &target,
            )?;
            if rendered.is_some() {
                stats.pages += 1;
            }
        }

        // 8. Consolidated stylesheets
        stats.stylesheets = self.write_stylesheets(&session.stylesheets())?;

        // 9. Robots
        RobotsGenerator::new(&website.robots, sitemap.location()).write(&self.output_dir)?;

        stats.inconsistencies = session.inconsistencies();
        stats.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            pages = stats.pages,
            aliases = stats.aliases,
            resources = stats.resources,
            stylesheets = stats.stylesheets,
            inconsistencies = stats.inconsistencies.len(),
            templates = session.compilations(),
            duration_ms = stats.duration_ms,
            "build complete"
        );

        Ok(stats)
    }

    /// Read the configured additional stylesheets, relative to the website.
    fn read_stylesheets(&self, website: &WebsiteSpec) -> Result<BTreeMap<String, String>> {
        website
            .additional_stylesheets
            .iter()
            .map(|(name, file)| {
                let path = self.website_dir.join(file);
                let css = fs::read_to_string(&path).map_err(|source| BuildError::Stylesheet {
                    name: name.clone(),
                    path,
                    source,
                })?;
                Ok((name.clone(), css))
            })
            .collect()
    }

    /// Render a node, then its children. Returns the built URLs in
    /// depth-first order.
    fn walk(
        &self,
        renderer: &NodeRenderer<'_>,
        tree: &ContentTree,
        id: NodeId,
        source_base: PathBuf,
        relative_url: String,
    ) -> Result<Vec<String>> {
        let relative_url = normalize_url(&relative_url);
        let node = tree.node(id);
        let mut urls = Vec::new();

        if node.spec.is_some() {
            let output_dir = self.output_dir.join(&relative_url);
            let rendered = renderer.render_node(
                node.spec.as_ref(),
                &source_base,
                &output_dir,
                &relative_url,
                &RenderTarget::content(),
            )?;
            urls.extend(rendered);
        }

        let children: Vec<_> = tree.children(id).collect();
        let child_urls = match self.mode {
            BuildMode::Sequential => children
                .iter()
                .map(|(child, child_node)| {
                    self.walk(
                        renderer,
                        tree,
                        *child,
                        source_base.join(&child_node.name),
                        join_url(&relative_url, &child_node.name),
                    )
                })
                .collect::<Result<Vec<_>>>()?,
            BuildMode::Parallel => children
                .par_iter()
                .map(|(child, child_node)| {
                    self.walk(
                        renderer,
                        tree,
                        *child,
                        source_base.join(&child_node.name),
                        join_url(&relative_url, &child_node.name),
                    )
                })
                .collect::<Result<Vec<_>>>()?,
        };
        urls.extend(child_urls.into_iter().flatten());

        Ok(urls)
    }

    /// Write the search-engine verification file.
    fn write_verification(&self, token: &str) -> Result<()> {
        let name = format!("google{token}.html");
        if !is_contained(&name) {
            return Ok(());
        }
        fs::write(
            self.output_dir.join(&name),
            format!("google-site-verification: {name}"),
        )?;
        debug!(file = %name, "wrote verification file");
        Ok(())
    }

    /// Write each stylesheet, minified, to `css/<name>.css`.
    fn write_stylesheets(&self, stylesheets: &BTreeMap<String, String>) -> Result<usize> {
        if stylesheets.is_empty() {
            return Ok(0);
        }
        let css_dir = self.output_dir.join("css");
        assets::ensure_dir(&css_dir)?;

        let mut count = 0;
        for (name, css) in stylesheets {
            if !is_contained(name) {
                continue;
            }
            let path = css_dir.join(format!("{name}.css"));
            if let Some(parent) = path.parent() {
                assets::ensure_dir(parent)?;
            }
            fs::write(&path, self.minifier.minify_style(css))?;
            debug!(path = %path.display(), "wrote stylesheet");
            count += 1;
        }
        Ok(count)
    }
}
