//! Butters Discovery
//!
//! Streams new Solana tokens, enriches and scores them on a fixed cycle.

use anyhow::Result;
use butters_discovery::adapters::cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (RPC keys go here, not in the config)
    dotenvy::dotenv().ok();

    let app = cli::init();
    cli::execute(app).await
}
