use hostdeck::config::CoreConfig;
use hostdeck::logging::{LogFormat, init_logging};
use hostdeck::services::ServiceContainer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize logging
    let format = std::env::var("HOSTDECK_LOG_FORMAT").unwrap_or_default();
    let _logging = init_logging(LogFormat::parse(&format))?;

    let config = CoreConfig::from_env()?;
    let container = ServiceContainer::new(config).await?;
    container.initialize().await?;

    tracing::info!("hostdeck initialized successfully");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");

    container.shutdown().await;
    Ok(())
}
