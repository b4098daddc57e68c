//! AdventureMap CLI: turn an adventure description into a KML map.
//!
//! Searches for matching places, resolves their coordinates, and publishes
//! the map file to cloud storage or the local artifact store.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
