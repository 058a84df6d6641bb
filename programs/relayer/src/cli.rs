//! Command line interface definitions.

use clap::{Args, Parser, Subcommand};

/// The hub-chain relayer command line.
#[derive(Parser)]
#[command(name = "hub-relayer", version, about)]
pub struct RelayerCli {
    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Parse and validate a relayer configuration file.
    Check(CheckArgs),
}

/// Arguments for the `check` subcommand.
#[derive(Args)]
pub struct CheckArgs {
    /// Path to the JSON configuration file.
    #[arg(long, short)]
    pub config: String,
}
