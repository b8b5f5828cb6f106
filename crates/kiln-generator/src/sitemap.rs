//! Sitemap generation.
//!
//! The sitemap is a plain text file listing one absolute URL per line.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use tracing::info;

/// File name of the sitemap in the output root.
pub const SITEMAP_FILE: &str = "sitemap.txt";

/// Sitemap generator.
#[derive(Debug, Clone)]
pub struct SitemapGenerator {
    base_url: String,
}

impl SitemapGenerator {
    /// Create a new sitemap generator for a site served at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Where the sitemap is published.
    #[must_use]
    pub fn location(&self) -> String {
        format!("{}/{SITEMAP_FILE}", self.base_url)
    }

    /// Sitemap text for `urls`, in order, without duplicates.
    #[must_use]
    pub fn generate(&self, urls: &[String]) -> String {
        let mut seen = HashSet::new();
        let mut text = String::new();
        for url in urls {
            if seen.insert(url.as_str()) {
                text.push_str(url);
                text.push('\n');
            }
        }
        text
    }

    /// Write the sitemap into `output_dir`.
    pub fn write(&self, output_dir: &Path, urls: &[String]) -> std::io::Result<PathBuf> {
        let path = output_dir.join(SITEMAP_FILE);
        fs::write(&path, self.generate(urls))?;
        info!(path = %path.display(), count = urls.len(), "generated sitemap");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_generate() {
        let generator = SitemapGenerator::new("https://example.com/");
        let urls = vec![
            "https://example.com/blog".to_string(),
            "https://example.com/blog/post".to_string(),
            "https://example.com/blog".to_string(),
        ];
        assert_eq!(
            generator.generate(&urls),
            "https://example.com/blog\nhttps://example.com/blog/post\n"
        );
        assert_eq!(generator.generate(&[]), "");
        assert_eq!(generator.location(), "https://example.com/sitemap.txt");
    }

    #[test]
    fn test_write() {
        let dir = TempDir::new().unwrap();
        let generator = SitemapGenerator::new("https://example.com");
        let path = generator
            .write(dir.path(), &["https://example.com/a".to_string()])
            .unwrap();
        assert_eq!(path, dir.path().join("sitemap.txt"));
        assert_eq!(fs::read_to_string(path).unwrap(), "https://example.com/a\n");
    }
}
