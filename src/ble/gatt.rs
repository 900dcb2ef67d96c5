//! GATT link handling.
//!
//! [`GattLink`] is the set of GATT operations a session needs from a single
//! peripheral. [`BtleplugLink`] implements it on top of a `btleplug`
//! peripheral.

use async_trait::async_trait;
use btleplug::api::{Characteristic, Peripheral as _};
use btleplug::platform::Peripheral;
use futures::stream::{BoxStream, StreamExt};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::ble::uuids::{CLIENT_CHARACTERISTIC_CONFIG_UUID, ENABLE_NOTIFICATION_VALUE};
use crate::error::{Error, Result};

/// A discovered GATT service and the characteristics it exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattService {
    /// Service UUID.
    pub uuid: Uuid,
    /// UUIDs of the characteristics in this service.
    pub characteristics: Vec<Uuid>,
}

impl GattService {
    /// Create a service description.
    pub fn new(uuid: Uuid, characteristics: Vec<Uuid>) -> Self {
        Self {
            uuid,
            characteristics,
        }
    }

    /// Check if the service exposes a characteristic.
    pub fn has_characteristic(&self, uuid: &Uuid) -> bool {
        self.characteristics.contains(uuid)
    }
}

/// Notification event from a characteristic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GattNotification {
    /// UUID of the characteristic that sent the notification.
    pub characteristic: Uuid,
    /// The notification data.
    pub value: Vec<u8>,
}

/// GATT operations on one peripheral.
#[async_trait]
pub trait GattLink: Send + Sync {
    /// Open the connection.
    async fn connect(&self) -> Result<()>;

    /// Close the connection.
    async fn disconnect(&self) -> Result<()>;

    /// Discover services and return them.
    async fn discover_services(&self) -> Result<Vec<GattService>>;

    /// Enable notifications on a characteristic.
    ///
    /// Implementations write the Client Characteristic Configuration
    /// descriptor so the peripheral starts sending notifications.
    async fn enable_notifications(&self, service: Uuid, characteristic: Uuid) -> Result<()>;

    /// Read a characteristic value.
    async fn read(&self, service: Uuid, characteristic: Uuid) -> Result<Vec<u8>>;

    /// Stream of notifications, in the order the peripheral sent them.
    ///
    /// The stream ends when the connection is lost.
    async fn notifications(&self) -> Result<BoxStream<'static, GattNotification>>;
}

/// [`GattLink`] backed by a `btleplug` peripheral.
#[derive(Debug, Clone)]
pub struct BtleplugLink {
    peripheral: Peripheral,
}

impl BtleplugLink {
    /// Wrap a peripheral.
    pub fn new(peripheral: Peripheral) -> Self {
        Self { peripheral }
    }

    /// Get the peripheral.
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    fn find_characteristic(&self, service: Uuid, characteristic: Uuid) -> Result<Characteristic> {
        self.peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == characteristic && c.service_uuid == service)
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: characteristic.to_string(),
            })
    }
}

#[async_trait]
impl GattLink for BtleplugLink {
    async fn connect(&self) -> Result<()> {
        if self.peripheral.is_connected().await.unwrap_or(false) {
            debug!("Peripheral already connected at BLE level");
            return Ok(());
        }

        self.peripheral.connect().await?;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        Ok(())
    }

    async fn discover_services(&self) -> Result<Vec<GattService>> {
        self.peripheral.discover_services().await?;

        let services = self
            .peripheral
            .services()
            .into_iter()
            .map(|service| {
                debug!(
                    "Found service {} with {} characteristics",
                    service.uuid,
                    service.characteristics.len()
                );
                GattService::new(
                    service.uuid,
                    service.characteristics.iter().map(|c| c.uuid).collect(),
                )
            })
            .collect();

        Ok(services)
    }

    async fn enable_notifications(&self, service: Uuid, characteristic: Uuid) -> Result<()> {
        let target = self.find_characteristic(service, characteristic)?;

        debug!(
            "Subscribing to {}, properties: {:?}",
            characteristic, target.properties
        );

        // btleplug writes the CCCD as part of subscribing.
        self.peripheral.subscribe(&target).await?;
        trace!(
            "Wrote {:02X?} to {} of {}",
            ENABLE_NOTIFICATION_VALUE,
            CLIENT_CHARACTERISTIC_CONFIG_UUID,
            characteristic
        );
        Ok(())
    }

    async fn read(&self, service: Uuid, characteristic: Uuid) -> Result<Vec<u8>> {
        let target = self.find_characteristic(service, characteristic)?;
        let data = self.peripheral.read(&target).await?;

        trace!("Read {} bytes from characteristic {}", data.len(), characteristic);

        Ok(data)
    }

    async fn notifications(&self) -> Result<BoxStream<'static, GattNotification>> {
        let stream = self.peripheral.notifications().await?;

        Ok(stream
            .map(|notification| GattNotification {
                characteristic: notification.uuid,
                value: notification.value,
            })
            .boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::uuids::*;

    #[test]
    fn test_service_has_characteristic() {
        let service = GattService::new(HEART_RATE_SERVICE_UUID, vec![HEART_RATE_MEASUREMENT_UUID]);
        assert!(service.has_characteristic(&HEART_RATE_MEASUREMENT_UUID));
        assert!(!service.has_characteristic(&CLIENT_CHARACTERISTIC_CONFIG_UUID));
    }
}
