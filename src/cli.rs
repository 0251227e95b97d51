///
/// This module implements the CLI interface for cms-pages: command parsing,
/// the async entrypoint and user-visible output.
///
/// All plugin logic (directives, queries, fetching, entry mapping) lives in the
/// [`cms-pages-core`] crate. This module only wires the on-disk host pipeline
/// ([`crate::site`]) to the plugin.
///
/// ## How To Use
/// - For command-line users: `cms-pages build --config site.yaml`, with
///   `CONTENTFUL_ACCESS_TOKEN` set in the environment or a `.env` file.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`cms-pages-core`]: ../../cms-pages-core/
use crate::load_config::load_config;
use crate::site::{read_source, write_output};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cms_pages_core::download::DeliveryClientFactory;
use cms_pages_core::CmsPlugin;
use std::path::PathBuf;

/// CLI for cms-pages: build a site with pages generated from CMS entries.
#[derive(Parser)]
#[clap(
    name = "cms-pages",
    version,
    about = "Fetch headless-CMS entries and materialise them as pages of a static site"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Read the source directory, fetch CMS entries and write the output directory
    Build {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Build { config } => {
            tracing::info!(command = "build", "Starting build");
            let config = load_config(config)?;

            // Token is checked before any source file is touched.
            let factory = DeliveryClientFactory::from_options(&config.plugin)
                .context("Failed to construct CMS client")?;
            let plugin = CmsPlugin::new(config.plugin, factory)
                .context("Invalid contentful plugin options")?;

            let mut files = read_source(&config.source)?;
            let report = match plugin.run(&mut files).await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!(command = "build", error = %e, "CMS fetch failed, aborting build");
                    return Err(anyhow::Error::new(e).context("Build aborted"));
                }
            };

            let written = write_output(&config.destination, &files)?;
            let failed = report.failed_fetches().count();
            println!(
                "Build complete: {written} files written to {} ({} from CMS, {failed} failed fetches).",
                config.destination.display(),
                report.synthesized_count(),
            );
            for file in report.failed_fetches() {
                eprintln!("[WARN] Could not fetch entries for {}", file.source);
            }
            Ok(())
        }
    }
}
