//! Overtake Controller - Main Entry Point
//!
//! Usage: overtake-controller [CONFIG] [SNAPSHOTS]
//!
//! Replays JSON-lines vehicle snapshots from SNAPSHOTS (stdin when absent)
//! and sends commands to the configured UDP endpoint.

use controller::{init_logging, ConfigStore, JsonLinesSource, OvertakeController, UdpCommandSink};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    info!("=== Overtake Controller v{} ===", env!("CARGO_PKG_VERSION"));

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "overtake.json".to_string());
    let config = ConfigStore::new(&config_path).load_or_default();

    let sink = UdpCommandSink::bind(&config.command_endpoint).await?;
    let reader: Box<dyn BufRead> = match args.next() {
        Some(path) => {
            info!("Replaying snapshots from {}", path);
            Box::new(BufReader::new(File::open(path)?))
        }
        None => {
            info!("Reading snapshots from stdin");
            Box::new(BufReader::new(io::stdin()))
        }
    };
    let mut source = JsonLinesSource::new(reader);

    let mut controller = OvertakeController::new(config, Box::new(sink));
    let running = controller.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                running.store(false, std::sync::atomic::Ordering::SeqCst);
            }
            Err(e) => warn!("Ctrl-C handler unavailable: {}", e),
        }
    });

    controller.run(&mut source).await?;

    let report = controller.status(overtake_model::now_ms());
    info!("Final status: {}", serde_json::to_string(&report)?);
    Ok(())
}
