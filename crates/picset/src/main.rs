//! Picset CLI - generate cached srcset matrices for images.
//!
//! Every source image is resized to each configured width and re-encoded to
//! each configured format. Variants land in the output directory under
//! content-addressed names, so re-running over the same inputs is nearly free.
//!
//! # Usage
//!
//! ```bash
//! # Generate variants for one image
//! picset generate cat.png
//!
//! # Generate a directory with explicit widths and formats
//! picset generate ./photos/ --widths 320,640,1280 --formats avif,webp,jpeg
//!
//! # Emit srcset attributes instead of full records
//! picset generate ./photos/ --srcset --format jsonl
//!
//! # View configuration
//! picset config show
//! ```

use clap::{Parser, Subcommand};

mod cli;
mod logging;

/// Picset - generate cached srcset matrices for images.
#[derive(Parser, Debug)]
#[command(name = "picset")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate resized, re-encoded variants and their records
    Generate(cli::generate::GenerateArgs),

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging isn't initialized yet, so config warnings go through eprintln.
    let config = match picset_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `picset config path`."
            );
            picset_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Picset v{}", picset_core::VERSION);

    match cli.command {
        Commands::Generate(args) => cli::generate::execute(args, config).await,
        Commands::Config(args) => cli::config::execute(args).await,
    }
}
