//! Kiln CLI Library
//!
//! Core functionality for the kiln command-line tool, used by the binary
//! entry point.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use kiln::cmd;
//!
//! // Build the website in `site/` into `public/`
//! cmd::build::run(Path::new("site"), Path::new("public"), "https://example.com", false).unwrap();
//! ```

pub mod cmd;

pub use kiln_core::{ThemeSpec, WebsiteSpec};
pub use kiln_generator::{BuildMode, BuildStats, Builder};

/// Initialize tracing with the specified verbosity level.
///
/// # Arguments
///
/// * `verbose` - Verbosity level (0 = WARN, 1 = INFO, 2 = DEBUG, 3+ = TRACE)
pub fn init_tracing(verbose: u8) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}
