//! tabdivider CLI: local-first page dividers.
//!
//! Saves pages into named, ordered dividers backed by a local database and
//! hands them back out again on request.

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
