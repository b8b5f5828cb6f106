//! Alias redirect pages.
//!
//! Each alias becomes `<alias>/index.html`, a page that immediately
//! redirects to the alias target.

use std::{collections::HashSet, fs, path::Path};

use kiln_core::path::is_contained;
use kiln_template::{Context, Template, TemplateCompiler};
use tracing::{debug, info};

use crate::{
    render::{RenderError, Result},
    session::{BuildSession, Inconsistency},
};

const REDIRECT_TEMPLATE: &str = concat!(
    "<html><head>",
    r#"<meta http-equiv="refresh" content="0; url=<%= target %>" />"#,
    "</head><body><p>",
    r#"This page has been moved to <a href="<%= target %>">here</a>."#,
    "</p></html>"
);

/// Writes redirect pages for aliases.
#[derive(Debug)]
pub struct AliasGenerator {
    template: Template,
}

impl Default for AliasGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl AliasGenerator {
    /// Create a new alias generator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            template: TemplateCompiler::with_bindings(["target"]).compile(REDIRECT_TEMPLATE),
        }
    }

    /// The redirect page for `target`.
    pub fn redirect_page(&self, target: &str) -> Result<String> {
        self.template
            .render(&Context::new().with_var("target", target))
            .map_err(|source| RenderError::Template {
                template: "redirect".to_string(),
                node: target.to_string(),
                source,
            })
    }

    /// Write a redirect page for each alias whose target was built.
    ///
    /// Aliases pointing elsewhere, and alias paths that are empty or leave
    /// `output_dir`, are reported and skipped. Returns the number written.
    pub fn generate<'a>(
        &self,
        aliases: impl IntoIterator<Item = (&'a String, &'a String)>,
        built: &HashSet<&str>,
        output_dir: &Path,
        session: &BuildSession,
    ) -> Result<usize> {
        let mut count = 0;
        for (alias, target) in aliases {
            if !built.contains(target.as_str()) {
                session.report(Inconsistency::AliasTargetMissing {
                    alias: alias.clone(),
                    target: target.clone(),
                });
                continue;
            }
            let relative = alias.trim_matches('/');
            if relative.is_empty() || !is_contained(relative) {
                session.report(Inconsistency::InvalidAliasPath {
                    alias: alias.clone(),
                });
                continue;
            }

            let dir = output_dir.join(relative);
            fs::create_dir_all(&dir)?;
            let file = dir.join("index.html");
            session.claim_output(&file);
            fs::write(&file, self.redirect_page(target)?)?;
            debug!(alias = %alias, target = %target, "generated redirect");
            count += 1;
        }

        if count > 0 {
            info!(count, "generated alias redirects");
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_redirect_page() {
        let page = AliasGenerator::new()
            .redirect_page("https://example.com/blog?a=1&b=2")
            .unwrap();
        assert_eq!(
            page,
            "<html><head><meta http-equiv=\"refresh\" content=\"0; url=https://example.com/blog?a=1&amp;b=2\" /></head><body><p>This page has been moved to <a href=\"https://example.com/blog?a=1&amp;b=2\">here</a>.</p></html>"
        );
    }

    #[test]
    fn test_generate_skips_unbuilt_and_escaping_aliases() {
        let out = TempDir::new().unwrap();
        let session = BuildSession::default();
        let mut aliases = BTreeMap::new();
        aliases.insert("old/blog".to_string(), "https://example.com/blog".to_string());
        aliases.insert("gone".to_string(), "https://example.com/nowhere".to_string());
        aliases.insert("../escape".to_string(), "https://example.com/blog".to_string());
        aliases.insert("/".to_string(), "https://example.com/blog".to_string());
        let built = HashSet::from(["https://example.com/blog"]);

        let count = AliasGenerator::new()
            .generate(&aliases, &built, out.path(), &session)
            .unwrap();

        assert_eq!(count, 1);
        let page = fs::read_to_string(out.path().join("old/blog/index.html")).unwrap();
        assert!(page.contains("url=https://example.com/blog"));
        assert!(!out.path().join("gone").exists());
        assert!(!out.path().parent().unwrap().join("escape").exists());

        let reported = session.inconsistencies();
        assert_eq!(reported.len(), 3);
        assert!(reported.contains(&Inconsistency::AliasTargetMissing {
            alias: "gone".to_string(),
            target: "https://example.com/nowhere".to_string(),
        }));
        assert!(reported.contains(&Inconsistency::InvalidAliasPath {
            alias: "../escape".to_string(),
        }));
        assert!(reported.contains(&Inconsistency::InvalidAliasPath {
            alias: "/".to_string(),
        }));
    }
}
