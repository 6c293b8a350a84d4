use anyhow::Result;
use prediction_relay::logging::{init_tracing_from_config, with_bootstrap_logging};
use prediction_relay::service::ApplicationBootstrap;
use prediction_relay::load_config;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::var("RELAY_CONFIG").ok();
    let config = with_bootstrap_logging(|| load_config(config_path.as_deref()))?;

    init_tracing_from_config(Some(&config.logging));

    ApplicationBootstrap::run(config).await
}
