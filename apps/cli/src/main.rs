//! newsdigest CLI: topic-driven news digests from Exa websets.
//!
//! Searches, waits for enrichment, writes a markdown report with a JSON
//! backup, and optionally narrates and emails it.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    // A missing .env is normal; real failures surface as config errors later.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
