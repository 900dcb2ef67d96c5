//! Basic example: Discover nearby BLE peripherals
//!
//! Run with: cargo run --example scan_devices

use hrm_rust_ble::{DeviceScanner, Result, ScanConfig, ScanState};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hrm_rust_ble=debug".parse().unwrap()),
        )
        .init();

    let config = ScanConfig::default().with_scan_window(Duration::from_secs(5));
    let scanner = DeviceScanner::with_config(config).await?;

    // Print the list every time it changes
    let _handle = scanner.on_devices_changed(|devices| {
        if devices.is_empty() {
            println!("\n-- new scan cycle --");
            return;
        }
        if let Some(latest) = devices.last() {
            println!(
                "  [{}] {}  RSSI: {:?} dBm",
                devices.len(),
                latest,
                latest.rssi()
            );
        }
    });

    match scanner.start_discovery().await? {
        ScanState::Scanning => println!("Scanning for 20 seconds..."),
        other => {
            println!("Cannot scan: {}", other);
            return Ok(());
        }
    }

    tokio::time::sleep(Duration::from_secs(20)).await;

    scanner.stop_discovery().await?;
    println!("\nDiscovery stopped. Last cycle saw {} devices.", scanner.devices().len());

    Ok(())
}
