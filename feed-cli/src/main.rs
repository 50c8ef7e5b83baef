//! # tideline
//!
//! CLI tool for exercising the tideline engine without a network.
//!
//! ## Commands
//!
//! - `replay`: Run a scripted session from a JSON fixture
//! - `check-config`: Validate an engine config file
//! - `menu`: Build the filter menu from a directory file
//!
//! ## Example
//!
//! ```bash
//! # Replay a session and print every snapshot
//! tideline replay --fixture session.json
//!
//! # Same, as JSON lines, with a custom config and the timeline on screen
//! tideline replay --fixture session.json --config tideline.toml --visible --json
//!
//! # Show the effective configuration
//! tideline check-config tideline.toml
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod fixture;

use commands::{check_config, menu, replay};

/// CLI tool for exercising the tideline engine.
#[derive(Parser, Debug)]
#[command(name = "tideline")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a scripted session and print the resulting snapshots
    Replay {
        /// Fixture file with pages, stream frames and steps
        #[arg(long, short)]
        fixture: PathBuf,

        /// Engine config file (defaults apply if omitted)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Treat the timeline as on screen, so stream creates are withheld
        #[arg(long)]
        visible: bool,

        /// Print one JSON object per step instead of text
        #[arg(long)]
        json: bool,
    },

    /// Validate a config file and print the effective values
    CheckConfig {
        /// Config file to check
        path: PathBuf,
    },

    /// Build the filter menu from a directory file
    Menu {
        /// JSON file with `lists`, `tags` and `servers`
        #[arg(long, short)]
        directory: PathBuf,

        /// Build the menu for a session without an account
        #[arg(long)]
        anonymous: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Replay {
            fixture,
            config,
            visible,
            json,
        } => {
            let options = replay::Options { visible, json };
            replay::run(&fixture, config.as_deref(), options).await?;
        }
        Commands::CheckConfig { path } => {
            check_config::run(&path)?;
        }
        Commands::Menu {
            directory,
            anonymous,
        } => {
            menu::run(&directory, !anonymous).await?;
        }
    }

    Ok(())
}
