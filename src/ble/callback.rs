//! GATT event listeners.
//!
//! A [`GattSession`](crate::ble::session::GattSession) reports connection
//! lifecycle and characteristic events to a [`GattCallback`]. The default
//! [`HeartRateGattCallback`] subscribes to heart rate measurements and hands
//! each decoded BPM value to a caller-supplied listener.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::ble::gatt::{GattLink, GattService};
use crate::ble::session::ConnectionState;
use crate::ble::uuids::*;
use crate::error::Error;
use crate::protocol::heart_rate::decode_bpm;

/// Listener for the events of one GATT connection.
///
/// All methods are invoked from the session's event task, one event at a
/// time and in arrival order. `on_characteristic_changed` runs inline with
/// notification delivery and must not block.
#[async_trait]
pub trait GattCallback: Send + Sync {
    /// The connection was established or lost.
    async fn on_connection_state_changed(&self, _link: &dyn GattLink, state: ConnectionState) {
        debug!("Connection state changed: {}", state);
    }

    /// Service discovery finished.
    async fn on_services_discovered(
        &self,
        link: &dyn GattLink,
        services: Result<&[GattService], &Error>,
    );

    /// A characteristic value arrived by notification or read.
    fn on_characteristic_changed(&self, characteristic: Uuid, value: &[u8]);
}

/// Callback that streams heart rate values to a listener.
pub struct HeartRateGattCallback {
    listener: Arc<dyn Fn(u16) + Send + Sync>,
}

impl HeartRateGattCallback {
    /// Create a callback forwarding every decoded BPM value to `listener`.
    pub fn new<F>(listener: F) -> Self
    where
        F: Fn(u16) + Send + Sync + 'static,
    {
        Self {
            listener: Arc::new(listener),
        }
    }
}

#[async_trait]
impl GattCallback for HeartRateGattCallback {
    async fn on_services_discovered(
        &self,
        link: &dyn GattLink,
        services: Result<&[GattService], &Error>,
    ) {
        let services = match services {
            Ok(services) => services,
            Err(e) => {
                warn!("Service discovery failed: {}", e);
                return;
            }
        };

        let Some(service) = services.iter().find(|s| is_heart_rate_service(&s.uuid)) else {
            warn!("Heart Rate service not found on device");
            return;
        };

        if !service.has_characteristic(&HEART_RATE_MEASUREMENT_UUID) {
            warn!("Heart Rate Measurement characteristic not found on device");
            return;
        }

        match link
            .enable_notifications(HEART_RATE_SERVICE_UUID, HEART_RATE_MEASUREMENT_UUID)
            .await
        {
            Ok(()) => info!("Subscribed to heart rate notifications"),
            Err(e) => warn!("Failed to enable heart rate notifications: {}", e),
        }
    }

    fn on_characteristic_changed(&self, characteristic: Uuid, value: &[u8]) {
        if characteristic != HEART_RATE_MEASUREMENT_UUID {
            trace!("Ignoring value from characteristic {}", characteristic);
            return;
        }

        match decode_bpm(value) {
            Ok(bpm) => {
                trace!("Heart rate: {} BPM", bpm);
                (self.listener)(bpm);
            }
            Err(e) => warn!("Dropping heart rate measurement {:02X?}: {}", value, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::fake::FakeLink;
    use parking_lot::Mutex;

    fn recording_callback() -> (HeartRateGattCallback, Arc<Mutex<Vec<u16>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (HeartRateGattCallback::new(move |bpm| sink.lock().push(bpm)), seen)
    }

    #[tokio::test]
    async fn test_enables_notifications_when_service_present() {
        let (callback, _) = recording_callback();
        let link = FakeLink::heart_rate_monitor();
        let services = link.discover_services().await.unwrap();

        callback.on_services_discovered(&*link, Ok(services.as_slice())).await;

        let expected = format!(
            "enable_notifications {} {}",
            HEART_RATE_SERVICE_UUID, HEART_RATE_MEASUREMENT_UUID
        );
        assert!(link.calls().contains(&expected));

        let cccd_write = format!(
            "write {} {:02X?}",
            CLIENT_CHARACTERISTIC_CONFIG_UUID,
            ENABLE_NOTIFICATION_VALUE
        );
        assert!(link.calls().contains(&cccd_write));
    }

    #[tokio::test]
    async fn test_missing_characteristic_is_abandoned() {
        let (callback, _) = recording_callback();
        let link = FakeLink::new();
        let services = vec![GattService::new(HEART_RATE_SERVICE_UUID, Vec::new())];

        callback.on_services_discovered(&*link, Ok(services.as_slice())).await;

        assert!(link.calls().is_empty());
    }

    #[tokio::test]
    async fn test_discovery_failure_is_abandoned() {
        let (callback, _) = recording_callback();
        let link = FakeLink::heart_rate_monitor();
        let error = Error::ServiceNotFound {
            uuid: HEART_RATE_SERVICE_UUID.to_string(),
        };

        callback.on_services_discovered(&*link, Err(&error)).await;

        assert!(link.calls().is_empty());
    }

    #[test]
    fn test_forwards_decoded_bpm() {
        let (callback, seen) = recording_callback();

        callback.on_characteristic_changed(HEART_RATE_MEASUREMENT_UUID, &[0x00, 0x4B]);
        callback.on_characteristic_changed(HEART_RATE_MEASUREMENT_UUID, &[0x01, 0xFF, 0x00]);

        assert_eq!(*seen.lock(), vec![75, 255]);
    }

    #[test]
    fn test_ignores_other_characteristics_and_bad_payloads() {
        let (callback, seen) = recording_callback();

        callback.on_characteristic_changed(CLIENT_CHARACTERISTIC_CONFIG_UUID, &[0x00, 0x4B]);
        callback.on_characteristic_changed(HEART_RATE_MEASUREMENT_UUID, &[0x01]);
        callback.on_characteristic_changed(HEART_RATE_MEASUREMENT_UUID, &[]);

        assert!(seen.lock().is_empty());
    }
}
