use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command-line interface for the `stablegate` payment gateway.
#[derive(Parser)]
#[command(name = "stablegate", about = "Stablecoin payment gateway", version, long_about = None)]
pub struct Cli {
    /// Path to the configuration file. Created with embedded defaults on
    /// first run if it doesn't exist.
    #[arg(long, default_value = "config/config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the gateway daemon: applies pending migrations, then starts the
    /// API server plus the outbox dispatcher and expiry sweeper background
    /// tasks until Ctrl+C.
    Serve,

    /// Apply pending database migrations and exit without starting the
    /// daemon. Useful for running migrations as a separate deploy step.
    Migrate,

    /// Print the configuration that would be used, with secrets redacted,
    /// and exit.
    PrintConfig,
}
