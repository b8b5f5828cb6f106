//! Kiln CLI
//!
//! Static site builder for JSON-described websites and EJS-style themes.
//!
//! This is the binary entry point. The library functionality is in `lib.rs`.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;

/// Command-line interface for kiln.
#[derive(Parser)]
#[command(name = "kiln", version, about = "A static site builder")]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands.
#[derive(clap::Subcommand)]
enum Commands {
    /// Build the website
    Build {
        /// Website directory containing website.json
        #[arg(default_value = ".")]
        website: PathBuf,
        /// Output directory
        #[arg(short, long, default_value = "public")]
        output: PathBuf,
        /// URL the site is published at (e.g., https://example.com)
        #[arg(short, long)]
        base_url: String,
        /// Render sibling pages in parallel
        #[arg(long)]
        parallel: bool,
    },
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    kiln::init_tracing(cli.verbose);

    match cli.command {
        Commands::Build {
            website,
            output,
            base_url,
            parallel,
        } => {
            kiln::cmd::build::run(&website, &output, &base_url, parallel)?;
        }
    }

    Ok(())
}
