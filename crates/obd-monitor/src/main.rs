//! Live OBD Monitor - Main Entry Point

use obd_monitor::{init_logging, load_config, run};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args().nth(1);
    let config = load_config(config_path.as_deref())?;
    init_logging(&config.log_level, config.json_logs)?;

    info!("=== OBD Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Adapter {}:{}, reading every {} ms",
        config.session.host, config.session.port, config.read_interval_ms
    );

    run(config).await?;

    Ok(())
}
