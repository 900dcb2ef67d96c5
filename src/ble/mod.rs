//! BLE communication module.
//!
//! This module provides the Bluetooth Low Energy functionality for
//! discovering peripherals and streaming heart rate data from them.

pub mod callback;
pub mod gatt;
pub mod peripheral;
pub mod radio;
pub mod scanner;
pub mod session;
pub mod uuids;

#[cfg(test)]
pub(crate) mod fake;

pub use callback::{GattCallback, HeartRateGattCallback};
pub use gatt::{BtleplugLink, GattLink, GattNotification, GattService};
pub use peripheral::PeripheralDescriptor;
pub use radio::{BleRadio, BtleplugRadio, RadioState};
pub use scanner::{DeviceScanner, ScanConfig, ScanState};
pub use session::{ConnectionState, GattSession};
pub use uuids::*;
