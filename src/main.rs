use std::time::Duration;
use uplink::{init_logging, App, AppParts, SystemClock, BUILD_DATE, VERSION};
use uplink_settings::{resolve_config_path, Config};

const STATUS_LOG_INTERVAL: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    init_logging()?;
    tracing::info!("Uplink {} (built {})", VERSION, BUILD_DATE);

    let config_path = resolve_config_path()?;
    let config = Config::load_or_default(&config_path)?;
    tracing::info!("Configuration: {}", config_path.display());

    let app = App::new(config, AppParts::default(), SystemClock::shared())?;
    app.start()?;

    tracing::info!("========================================");
    tracing::info!("  System initialization complete!");
    tracing::info!("========================================");

    let mut ticker = tokio::time::interval(STATUS_LOG_INTERVAL);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tracing::info!("System state: {}", app.state_name());
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::warn!("Signal handler failed: {}", e);
                }
                break;
            }
        }
    }

    app.shutdown();
    Ok(())
}
