//! Bluetooth radio access.
//!
//! [`BleRadio`] covers what discovery needs from the local adapter: whether
//! the radio is usable, scan control, and a stream of sighted peripherals.

use async_trait::async_trait;
use btleplug::api::{Central, CentralEvent, CentralState, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, PeripheralId};
use futures::stream::{BoxStream, StreamExt};
use std::sync::Arc;
use tracing::{debug, info, trace};

use crate::ble::gatt::BtleplugLink;
use crate::ble::peripheral::PeripheralDescriptor;
use crate::error::{Error, Result};

/// Availability of the local Bluetooth radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RadioState {
    /// Radio present and powered on.
    PoweredOn,
    /// Radio present but off, or its state is unknown.
    PoweredOff,
    /// Radio lacks Bluetooth Low Energy support.
    Unsupported,
}

/// The local Bluetooth adapter as seen by the scanner.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BleRadio: Send + Sync {
    /// Query radio availability.
    async fn state(&self) -> Result<RadioState>;

    /// Start an active scan.
    async fn start_scan(&self) -> Result<()>;

    /// Stop the active scan.
    async fn stop_scan(&self) -> Result<()>;

    /// Stream of peripherals sighted from now on.
    ///
    /// A peripheral may be yielded more than once.
    async fn discoveries(&self) -> Result<BoxStream<'static, PeripheralDescriptor>>;
}

/// [`BleRadio`] backed by a `btleplug` adapter.
#[derive(Debug, Clone)]
pub struct BtleplugRadio {
    adapter: Adapter,
}

impl BtleplugRadio {
    /// Open the first Bluetooth adapter on this system.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self { adapter })
    }

    /// Use a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self { adapter }
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Build a descriptor for a sighted peripheral.
    async fn describe(adapter: &Adapter, id: PeripheralId) -> Option<PeripheralDescriptor> {
        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return None;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return None,
        };

        // CoreBluetooth hides addresses; fall back to the platform id.
        let address = if properties.address.into_inner() == [0u8; 6] {
            id.to_string()
        } else {
            properties.address.to_string()
        };

        Some(PeripheralDescriptor::new(
            address,
            properties.local_name,
            properties.rssi,
            Arc::new(BtleplugLink::new(peripheral)),
        ))
    }
}

#[async_trait]
impl BleRadio for BtleplugRadio {
    async fn state(&self) -> Result<RadioState> {
        let state = match self.adapter.adapter_state().await? {
            CentralState::PoweredOn => RadioState::PoweredOn,
            _ => RadioState::PoweredOff,
        };
        Ok(state)
    }

    async fn start_scan(&self) -> Result<()> {
        self.adapter.start_scan(ScanFilter::default()).await?;
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.adapter.stop_scan().await?;
        Ok(())
    }

    async fn discoveries(&self) -> Result<BoxStream<'static, PeripheralDescriptor>> {
        let events = self.adapter.events().await?;
        let adapter = self.adapter.clone();

        let stream = events.filter_map(move |event| {
            let adapter = adapter.clone();
            async move {
                match event {
                    CentralEvent::DeviceDiscovered(id) => {
                        trace!("Device discovered: {:?}", id);
                        Self::describe(&adapter, id).await
                    }
                    CentralEvent::DeviceUpdated(id) => {
                        trace!("Device updated: {:?}", id);
                        Self::describe(&adapter, id).await
                    }
                    CentralEvent::StateUpdate(state) => {
                        debug!("Adapter state changed: {:?}", state);
                        None
                    }
                    _ => None,
                }
            }
        });

        Ok(stream.boxed())
    }
}
