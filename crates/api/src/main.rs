//! Drowsiness Monitor - Main Entry Point
//!
//! Usage: `drowsiness-monitor [config.toml]`

use std::path::PathBuf;

use api::{init_logging, run_server, AppConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;
    init_logging(&config.logging)?;

    info!("=== Drowsiness Monitor v{} ===", env!("CARGO_PKG_VERSION"));
    info!(
        "Thresholds: sleep < {}, drowsy < {}, {} consecutive frames",
        config.thresholds.sleep_threshold,
        config.thresholds.drowsy_threshold,
        config.thresholds.consec_frames
    );

    run_server(config).await?;

    Ok(())
}
