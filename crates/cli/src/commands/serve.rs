//! `threadline serve` — start the HTTP relay server.

use threadline_config::AppConfig;

pub async fn run(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load()?;
    if let Some(port) = port {
        config.gateway.port = port;
    }

    tracing::debug!(?config, "Loaded configuration");
    threadline_gateway::start(config).await
}
