use anyhow::Result;
use helios::logging::{get_logger, init_logging};
use helios::settings::{JsonFileSettings, SettingsStore};
use helios::telemetry::format_clock;
use helios::{Config, Display, Monitor, VERSION};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Helios {} starting up, API at {}", VERSION, config.api.base_url);

    let logger = get_logger("main");
    match JsonFileSettings::open(&config.settings_file) {
        Ok(settings) => logger.info(&format!("Theme: {:?}", settings.theme())),
        Err(e) => logger.warn(&format!(
            "Could not read settings from {}: {}",
            config.settings_file, e
        )),
    }

    let monitor = Monitor::start(&config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start monitor: {}", e))?;
    let mut updates = monitor.subscribe();

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!("Failed to listen for Ctrl-C: {}", e);
                }
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let session = updates.borrow_and_update().clone();
                if session.is_refreshing() {
                    continue;
                }
                if let Some(err) = session.last_error() {
                    logger.warn(&err.banner());
                }
                let display = session.display();
                let updated = session
                    .last_update()
                    .map(|t| format_clock(&t.with_timezone(&chrono::Local)))
                    .unwrap_or_else(|| "--:--".to_string());
                match display {
                    Display::Reading(_) => logger.info(&format!(
                        "[{:?}] {} (updated {})",
                        session.mode(),
                        display.summary_line(),
                        updated
                    )),
                    _ => logger.info(&display.summary_line()),
                }
            }
        }
    }

    info!("Shutting down");
    monitor.shutdown().await;
    Ok(())
}
