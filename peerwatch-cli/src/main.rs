//! # peerwatch
//!
//! CLI tool for inspecting peerwatch configuration and replaying device
//! activity against the state tracker.
//!
//! ## Commands
//!
//! - `check-config`: Load and validate a configuration file
//! - `replay`: Feed an activity script through a device registry
//! - `device-id`: Derive a device id from a name
//!
//! ## Example
//!
//! ```bash
//! # Validate configuration
//! peerwatch check-config --config peerwatch.toml
//!
//! # Replay a session and watch the events
//! peerwatch replay --config peerwatch.toml session.txt
//!
//! # Which id does "laptop" get in scripts?
//! peerwatch device-id laptop
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod script;

use commands::{check_config, device_id, replay};

/// CLI tool for peerwatch device activity tracking.
#[derive(Parser, Debug)]
#[command(name = "peerwatch")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load and validate a configuration file
    CheckConfig {
        /// Path to the TOML configuration
        #[arg(long, short, default_value = "peerwatch.toml")]
        config: PathBuf,
    },

    /// Replay an activity script and print every device event as JSON
    Replay {
        /// Path to the TOML configuration (defaults apply when omitted)
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Script file, one step per line
        script: PathBuf,
    },

    /// Print the device id derived from a name
    DeviceId {
        /// Device name as used in replay scripts
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so event output on stdout stays machine-readable
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::CheckConfig { config } => {
            check_config::run(&config).await?;
        }
        Commands::Replay { config, script } => {
            replay::run(config.as_deref(), &script).await?;
        }
        Commands::DeviceId { name } => {
            device_id::run(&name).await?;
        }
    }

    Ok(())
}
