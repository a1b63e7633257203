/// ChatFlow service - main entry point
use chatflow_core::service;
use chatflow_core::Config;
use std::env;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    // Parse configuration
    let args: Vec<String> = env::args().collect();
    let config = Config::from_args(&args)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    info!("Starting ChatFlow service");
    info!("   API: {}", config.api_addr);
    info!("   Bridge: udp://{}", config.bridge_addr);
    if let Some(path) = &config.buffered_path {
        info!("   Buffered messages: {}", path.display());
    }

    // Runs until Ctrl+C
    service::run(config).await
        .map_err(|e| anyhow::anyhow!("Service error: {}", e))?;

    Ok(())
}
