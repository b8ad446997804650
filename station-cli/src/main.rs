//! Binary crate for the `station` relay.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Wiring the core context and running the service
//! - Interactive configuration and operator commands

use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cmd = cli::Cli::parse();
    cmd.run().await
}
