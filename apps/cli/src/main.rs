//! keywatch CLI: scheduled keyword watching over web pages.
//!
//! Scans subscriber URLs for keywords, records what newly appeared, and
//! notifies subscribers who asked for it.

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
