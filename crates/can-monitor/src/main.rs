//! CAN Monitor - Main Entry Point

use can_monitor::{init_logging, run, MonitorConfig};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = MonitorConfig::load(config_path.as_deref())?;
    init_logging(&config)?;

    info!("=== CAN Monitor v{} ===", env!("CARGO_PKG_VERSION"));

    let (stats, _) = run(config, std::io::stdout()).await?;
    info!(
        "Stopped: {} frames received, {} sent, {} dropped",
        stats.rx_queued, stats.tx_sent, stats.rx_dropped
    );
    Ok(())
}
