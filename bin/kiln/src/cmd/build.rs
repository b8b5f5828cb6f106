//! Build command - publishes the website

use std::{path::Path, time::Instant};

use color_eyre::eyre::{Result, WrapErr};
use kiln_generator::{BuildMode, Builder};

/// Run the build command.
///
/// Builds the website in `website` into `output`, with page URLs rooted at
/// `base_url`.
pub fn run(website: &Path, output: &Path, base_url: &str, parallel: bool) -> Result<()> {
    let start = Instant::now();
    tracing::info!(?website, ?output, base_url, parallel, "Starting build");

    let mode = if parallel {
        BuildMode::Parallel
    } else {
        BuildMode::Sequential
    };
    let stats = Builder::new(website, output, base_url)
        .with_mode(mode)
        .build()
        .wrap_err_with(|| format!("Failed to build {}", website.display()))?;

    let duration = start.elapsed();

    println!();
    println!("  Build completed successfully!");
    println!();
    println!("  Pages:       {}", stats.pages);
    println!("  Aliases:     {}", stats.aliases);
    println!("  Resources:   {}", stats.resources);
    println!("  Stylesheets: {}", stats.stylesheets);
    println!();
    if !stats.inconsistencies.is_empty() {
        println!("  Warnings:");
        for inconsistency in &stats.inconsistencies {
            println!("  ⚠ {inconsistency}");
        }
        println!();
    }
    println!("  Duration:    {:.2}s", duration.as_secs_f64());
    println!("  Output:      {}", output.display());
    println!();

    tracing::info!(?stats, ?duration, "Build completed successfully");

    Ok(())
}
