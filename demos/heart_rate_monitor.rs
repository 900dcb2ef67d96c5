//! Stream heart rate from the first monitor that advertises a name
//! containing the given filter (default: any device).
//!
//! Run with: cargo run --example heart_rate_monitor -- "Polar"

use hrm_rust_ble::{ConnectionState, DeviceScanner, HeartRateGattCallback, Result, ScanState};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("hrm_rust_ble=info".parse().unwrap()),
        )
        .init();

    let filter = std::env::args().nth(1).unwrap_or_default();

    let scanner = DeviceScanner::new().await?;
    if scanner.start_discovery().await? != ScanState::Scanning {
        println!("Bluetooth is not available");
        return Ok(());
    }

    println!("Looking for a heart rate monitor matching {:?}...", filter);

    let mut devices = scanner.subscribe_devices();
    let device = loop {
        let found = devices
            .borrow_and_update()
            .iter()
            .find(|d| d.name().is_some_and(|n| n.contains(&filter)))
            .cloned();
        if let Some(device) = found {
            break device;
        }
        if devices.changed().await.is_err() {
            return Ok(());
        }
    };

    scanner.stop_discovery().await?;
    println!("Connecting to {}", device);

    let session = scanner.connect(
        &device,
        HeartRateGattCallback::new(|bpm| println!("Heart rate: {} BPM", bpm)),
    )?;

    let _state_handle = session.on_state_changed(|state| {
        if *state == ConnectionState::Disconnected {
            println!("Disconnected");
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = tokio::time::sleep(Duration::from_secs(120)) => {}
    }

    session.disconnect().await?;

    Ok(())
}
