//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// fluxer - FluxApp controller
#[derive(Parser, Debug)]
#[command(name = "fluxer")]
#[command(version)]
#[command(about = "Converges FluxApps into Flux image, source and Helm release resources")]
#[command(
    long_about = "fluxer derives an ImageRepository, ImagePolicy, HelmRepository and HelmRelease from each FluxApp and keeps them converged. Commands run against an in-memory object store seeded from manifest files."
)]
pub struct Cli {
    /// Controller configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dry-run the full chain for the FluxApps in a manifest and print the result
    Plan {
        /// Manifest file with one or more FluxApp documents
        #[arg(short, long)]
        file: PathBuf,

        /// Simulate the image policy selecting this reference (repository:tag)
        #[arg(long)]
        latest_image: Option<String>,

        /// Simulate the Helm release reporting Ready
        #[arg(long, default_value_t = false)]
        ready: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Yaml)]
        output: OutputFormat,
    },

    /// Print the child names derived for each FluxApp
    Names {
        /// Manifest file with one or more FluxApp documents
        #[arg(short, long)]
        file: PathBuf,

        /// Resolved chart repository to name the HelmRepository after
        #[arg(long)]
        repository: Option<String>,
    },

    /// Run the reconciliation loop over the FluxApps in a manifest until Ctrl+C
    Run {
        /// Manifest file with one or more FluxApp documents
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Yaml,
    Json,
}
