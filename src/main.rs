//! azblob - Azure Blob Storage command-line tool
//!
//! Lists, uploads, downloads and deletes blobs and containers, hands out
//! time-limited read URLs and checks storage account health.

use azblob_service::cli::Cli;
use azblob_service::config::load_settings;
use azblob_service::error::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Initialize logging
    init_logging(cli.debug);

    // Execute the command
    if let Err(e) = run(cli).await {
        error!("Error: {}", e);
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    info!("Starting azblob");

    let settings = load_settings(cli.config.as_deref())?;
    cli.execute(settings).await
}

fn init_logging(debug: bool) {
    let default_filter = if debug { "azblob=debug" } else { "azblob=info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
