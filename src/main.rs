mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use privacy_proxy::api;
use privacy_proxy::config::Config;
use privacy_proxy::observability::Metrics;
use privacy_proxy::storage::ResponseCache;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    info!("Loading configuration");
    let mut config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Serve(args) => {
            if let Some(address) = args.address {
                config.server.bind_addr = address;
            }
            api::run(config).await?;
        }
        Commands::Retrieve(args) => {
            let scheduler = api::build_scheduler(
                &config,
                Arc::new(ResponseCache::new()),
                Arc::new(Metrics::new()),
            )?;
            let report = scheduler.run(&args.provider).await?;

            for (url, reason) in &report.failed {
                error!(provider = %report.provider, url, reason, "Endpoint not retrieved");
            }
            info!(
                provider = %report.provider,
                files = ?report.succeeded,
                failed = report.failed.len(),
                "Retrieval finished"
            );

            if !report.failed.is_empty() {
                return Err(format!("{} endpoint(s) failed", report.failed.len()).into());
            }
        }
    }

    Ok(())
}
