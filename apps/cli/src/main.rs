//! Further CLI: find free ebooks, download them, and read them locally.
//!
//! Also hosts the HTTP API (`further serve`) and the MCP stdio server
//! (`further mcp`).

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
