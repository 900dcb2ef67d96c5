// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # hrm-rust-ble
//!
//! A cross-platform Rust library for discovering Bluetooth Low Energy heart
//! rate monitors and streaming beats-per-minute readings from them.
//!
//! ## Features
//!
//! - **Device Discovery**: Recurring scan cycles with a deduplicated,
//!   observable list of nearby peripherals
//! - **GATT Sessions**: Connect, discover the Heart Rate service and
//!   subscribe to measurement notifications
//! - **Measurement Decoding**: 8- and 16-bit heart rate values, sensor
//!   contact, energy expended and RR-intervals
//! - **Swappable Listeners**: Replace a session's callback while connected
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hrm_rust_ble::{DeviceScanner, HeartRateGattCallback, Result, ScanState};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let scanner = DeviceScanner::new().await?;
//!     if scanner.start_discovery().await? != ScanState::Scanning {
//!         return Ok(());
//!     }
//!
//!     // Wait for peripherals to be discovered
//!     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
//!     scanner.stop_discovery().await?;
//!
//!     if let Some(device) = scanner.devices().first() {
//!         let session = scanner.connect(
//!             device,
//!             HeartRateGattCallback::new(|bpm| println!("{} BPM", bpm)),
//!         )?;
//!
//!         tokio::time::sleep(std::time::Duration::from_secs(30)).await;
//!         session.disconnect().await?;
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps. Peripheral addresses are hidden, so
//! the platform identifier is used in their place.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod error;
pub mod observable;
pub mod protocol;

// Re-exports for convenience
pub use error::{Error, Result};
pub use observable::{CallbackHandle, Observable};

pub use ble::callback::{GattCallback, HeartRateGattCallback};
pub use ble::peripheral::PeripheralDescriptor;
pub use ble::scanner::{DeviceScanner, ScanConfig, ScanState};
pub use ble::session::{ConnectionState, GattSession};
pub use protocol::{decode_bpm, HeartRateMeasurement};
