//! In-memory radio and GATT link used by unit tests.

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::ble::gatt::{GattLink, GattNotification, GattService};
use crate::ble::peripheral::PeripheralDescriptor;
use crate::ble::radio::{BleRadio, RadioState};
use crate::ble::uuids::*;
use crate::error::{Error, Result};

/// Scripted GATT link that records every operation.
pub(crate) struct FakeLink {
    services: Mutex<Vec<GattService>>,
    fail_connect: AtomicBool,
    fail_notifications: AtomicBool,
    read_value: Mutex<Vec<u8>>,
    calls: Mutex<Vec<String>>,
    notify_tx: Mutex<Option<mpsc::UnboundedSender<GattNotification>>>,
}

impl FakeLink {
    /// Link with no services.
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            services: Mutex::new(Vec::new()),
            fail_connect: AtomicBool::new(false),
            fail_notifications: AtomicBool::new(false),
            read_value: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            notify_tx: Mutex::new(None),
        })
    }

    /// Link exposing the Heart Rate service and measurement characteristic.
    pub(crate) fn heart_rate_monitor() -> Arc<Self> {
        let link = Self::new();
        link.services.lock().push(GattService::new(
            HEART_RATE_SERVICE_UUID,
            vec![HEART_RATE_MEASUREMENT_UUID],
        ));
        link
    }

    pub(crate) fn set_services(&self, services: Vec<GattService>) {
        *self.services.lock() = services;
    }

    pub(crate) fn fail_connect(&self) {
        self.fail_connect.store(true, Ordering::SeqCst);
    }

    pub(crate) fn fail_notifications(&self) {
        self.fail_notifications.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_read_value(&self, value: &[u8]) {
        *self.read_value.lock() = value.to_vec();
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Deliver a notification; returns false if nobody is listening.
    pub(crate) fn notify(&self, characteristic: Uuid, value: &[u8]) -> bool {
        match self.notify_tx.lock().as_ref() {
            Some(tx) => tx
                .unbounded_send(GattNotification {
                    characteristic,
                    value: value.to_vec(),
                })
                .is_ok(),
            None => false,
        }
    }

    /// End the notification stream, as a dropped connection does.
    pub(crate) fn drop_connection(&self) {
        self.notify_tx.lock().take();
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }
}

#[async_trait]
impl GattLink for FakeLink {
    async fn connect(&self) -> Result<()> {
        self.record("connect");
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::ConnectionFailed {
                reason: "peripheral out of range".to_string(),
            });
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.record("disconnect");
        tokio::task::yield_now().await;
        Ok(())
    }

    async fn discover_services(&self) -> Result<Vec<GattService>> {
        self.record("discover_services");
        Ok(self.services.lock().clone())
    }

    async fn enable_notifications(&self, service: Uuid, characteristic: Uuid) -> Result<()> {
        self.record(format!("enable_notifications {} {}", service, characteristic));
        self.record(format!(
            "write {} {:02X?}",
            CLIENT_CHARACTERISTIC_CONFIG_UUID, ENABLE_NOTIFICATION_VALUE
        ));
        Ok(())
    }

    async fn read(&self, _service: Uuid, characteristic: Uuid) -> Result<Vec<u8>> {
        self.record(format!("read {}", characteristic));
        Ok(self.read_value.lock().clone())
    }

    async fn notifications(&self) -> Result<BoxStream<'static, GattNotification>> {
        if self.fail_notifications.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        let (tx, rx) = mpsc::unbounded();
        *self.notify_tx.lock() = Some(tx);
        Ok(rx.boxed())
    }
}

/// Radio whose sightings are pushed by the test.
pub(crate) struct FakeRadio {
    state: Mutex<RadioState>,
    scans_started: AtomicUsize,
    scans_stopped: AtomicUsize,
    sightings_tx: Mutex<Option<mpsc::UnboundedSender<PeripheralDescriptor>>>,
}

impl FakeRadio {
    pub(crate) fn new(state: RadioState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            scans_started: AtomicUsize::new(0),
            scans_stopped: AtomicUsize::new(0),
            sightings_tx: Mutex::new(None),
        })
    }

    pub(crate) fn set_state(&self, state: RadioState) {
        *self.state.lock() = state;
    }

    pub(crate) fn scans_started(&self) -> usize {
        self.scans_started.load(Ordering::SeqCst)
    }

    pub(crate) fn scans_stopped(&self) -> usize {
        self.scans_stopped.load(Ordering::SeqCst)
    }

    /// Report a sighting of `address` to the current scan cycle.
    pub(crate) fn sight(&self, address: &str, name: Option<&str>) -> bool {
        let peripheral = PeripheralDescriptor::new(
            address,
            name.map(str::to_string),
            Some(-55),
            FakeLink::new(),
        );
        match self.sightings_tx.lock().as_ref() {
            Some(tx) => tx.unbounded_send(peripheral).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl BleRadio for FakeRadio {
    async fn state(&self) -> Result<RadioState> {
        // Real adapters answer asynchronously; let concurrent callers interleave.
        tokio::task::yield_now().await;
        Ok(*self.state.lock())
    }

    async fn start_scan(&self) -> Result<()> {
        self.scans_started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_scan(&self) -> Result<()> {
        self.scans_stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn discoveries(&self) -> Result<BoxStream<'static, PeripheralDescriptor>> {
        let (tx, rx) = mpsc::unbounded();
        *self.sightings_tx.lock() = Some(tx);
        Ok(rx.boxed())
    }
}
