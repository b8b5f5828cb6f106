//! Robots.txt generation.
//!
//! Generates the robots.txt file for search engine crawlers.

use std::{collections::BTreeMap, fmt::Write, fs, path::Path};

use tracing::info;

/// Robots.txt generator.
#[derive(Debug)]
pub struct RobotsGenerator<'a> {
    rules: &'a BTreeMap<String, Vec<(String, String)>>,
    sitemap_url: String,
}

impl<'a> RobotsGenerator<'a> {
    /// Create a new robots generator from per-agent rules.
    #[must_use]
    pub fn new(rules: &'a BTreeMap<String, Vec<(String, String)>>, sitemap_url: impl Into<String>) -> Self {
        Self {
            rules,
            sitemap_url: sitemap_url.into(),
        }
    }

    /// Generate the file contents: one block per user agent, then the
    /// sitemap location.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut text = String::new();
        for (agent, rules) in self.rules {
            let _ = writeln!(text, "User-agent: {agent}");
            for (name, value) in rules {
                let _ = writeln!(text, "{name}: {value}");
            }
            text.push('\n');
        }
        let _ = writeln!(text, "Sitemap: {}", self.sitemap_url);
        text
    }

    /// Write robots.txt into `output_dir` when any rules are configured.
    ///
    /// Returns whether a file was written.
    pub fn write(&self, output_dir: &Path) -> std::io::Result<bool> {
        if self.rules.is_empty() {
            return Ok(false);
        }

        info!("generating robots.txt");
        fs::write(output_dir.join("robots.txt"), self.generate())?;
        Ok(true)
    }
}
