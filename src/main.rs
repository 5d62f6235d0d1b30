//! toolpilot - HTTP Server Entry Point
//!
//! Serves the browser chat UI and its API.

use toolpilot::{api, config::Config, init_tracing};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Configuration errors are fatal before anything else starts.
    let config = Config::from_env()?;

    init_tracing(&config.default_log_filter(), false);
    info!(
        "Loaded configuration: model={}, workspace={}",
        config.llm.model,
        config.workspace_path.display()
    );
    if config.tools.weather_api_key.is_none() {
        tracing::warn!("WEATHER_API_KEY not set; weather_fetcher will report an error");
    }

    info!("Starting server on {}:{}", config.host, config.port);
    api::serve(config).await?;

    Ok(())
}
