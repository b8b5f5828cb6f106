//! Kiln Generator Library
//!
//! Turns a website directory (specification, theme and content tree) into a
//! published directory of pages and resources.
//!
//! # Modules
//!
//! - [`tree`] - Content tree gathering
//! - [`render`] - Rendering of individual nodes
//! - [`session`] - Per-build caches and inconsistency reporting
//! - [`assets`] - Resource copying
//! - [`sitemap`] - Plain text sitemap generation
//! - [`robots`] - robots.txt generation
//! - [`alias`] - Alias redirect pages
//! - [`build`] - Build orchestration

pub mod alias;
pub mod assets;
pub mod build;
pub mod render;
pub mod robots;
pub mod session;
pub mod sitemap;
pub mod tree;

pub use alias::AliasGenerator;
pub use build::{BuildError, BuildMode, BuildStats, Builder};
pub use render::{NodeRenderer, RenderTarget, Site};
pub use robots::RobotsGenerator;
pub use session::{BuildSession, Inconsistency};
pub use sitemap::SitemapGenerator;
pub use tree::{ContentNode, ContentTree, NodeId};
