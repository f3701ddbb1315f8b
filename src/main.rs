use anyhow::Context;
use expense_tracker::{config::ServiceConfig, init_tracing, run};
use std::env;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config file path from the command line; a missing file means defaults
    let config_path = env::args()
        .nth(1)
        .unwrap_or_else(|| "config/service.yaml".to_string());

    let config = ServiceConfig::load(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;
    config.validate().context("invalid configuration")?;

    init_tracing(config.logging.format)?;

    run(config).await?;
    Ok(())
}
