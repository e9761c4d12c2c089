//! RegisterScout CLI: find and archive councillors' registers of interests.
//!
//! Discovers each official's register through the council's councillor
//! index, web search or a crawl of the council website, and stores the
//! confirmed document in a local libSQL database.

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
