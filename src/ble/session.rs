//! GATT session management.
//!
//! A [`GattSession`] owns at most one connection to a peripheral. Connecting
//! spawns a single event task that establishes the link, discovers services
//! and then relays notifications, reporting each step to the session's
//! [`GattCallback`]. Events from a connection that has since been closed are
//! dropped.

use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::ble::callback::{GattCallback, HeartRateGattCallback};
use crate::ble::gatt::GattLink;
use crate::ble::peripheral::PeripheralDescriptor;
use crate::ble::uuids::{HEART_RATE_MEASUREMENT_UUID, HEART_RATE_SERVICE_UUID};
use crate::error::{Error, Result};
use crate::observable::{CallbackHandle, Observable};

/// Connection state for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// Not connected to a device.
    #[default]
    Disconnected,
    /// Currently attempting to connect.
    Connecting,
    /// Connected to the device.
    Connected,
    /// Currently disconnecting.
    Disconnecting,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Disconnecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// The connection handle held while a session is connected.
struct ActiveConnection {
    generation: u64,
    address: String,
    link: Arc<dyn GattLink>,
}

/// State shared between the session and its event task.
struct Shared {
    callback: RwLock<Arc<dyn GattCallback>>,
    connection: RwLock<Option<ActiveConnection>>,
    state: Observable<ConnectionState>,
    generation_counter: AtomicU64,
}

impl Shared {
    fn callback(&self) -> Arc<dyn GattCallback> {
        self.callback.read().clone()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.connection
            .read()
            .as_ref()
            .is_some_and(|c| c.generation == generation)
    }

    /// Set `new_state` if `generation` still holds the connection.
    ///
    /// The state is written under the connection lock so a concurrent
    /// `connect` or `disconnect` cannot interleave with it.
    fn set_state_if_current(&self, generation: u64, new_state: ConnectionState) -> bool {
        let connection = self.connection.read();
        if connection.as_ref().is_some_and(|c| c.generation == generation) {
            self.set_state(new_state);
            true
        } else {
            false
        }
    }

    /// Drop the handle and mark the session disconnected if the handle
    /// still belongs to `generation`.
    fn release(&self, generation: u64) -> bool {
        let mut connection = self.connection.write();
        if connection.as_ref().is_some_and(|c| c.generation == generation) {
            *connection = None;
            self.set_state(ConnectionState::Disconnected);
            true
        } else {
            false
        }
    }

    /// Update the connection state and notify observers.
    fn set_state(&self, new_state: ConnectionState) {
        let old_state = self.state.get();
        if old_state != new_state {
            debug!("Connection state changed: {} -> {}", old_state, new_state);
            self.state.set(new_state);
        }
    }
}

/// A GATT client session for one device at a time.
pub struct GattSession {
    shared: Arc<Shared>,
}

impl GattSession {
    /// Create a session that reports events to `callback`.
    pub fn new<C>(callback: C) -> Self
    where
        C: GattCallback + 'static,
    {
        Self {
            shared: Arc::new(Shared {
                callback: RwLock::new(Arc::new(callback)),
                connection: RwLock::new(None),
                state: Observable::new(ConnectionState::Disconnected),
                generation_counter: AtomicU64::new(0),
            }),
        }
    }

    /// Create a session that streams heart rate values to `listener`.
    pub fn with_heart_rate_listener<F>(listener: F) -> Self
    where
        F: Fn(u16) + Send + Sync + 'static,
    {
        Self::new(HeartRateGattCallback::new(listener))
    }

    /// Replace the callback. Takes effect from the next event.
    pub fn set_callback<C>(&self, callback: C)
    where
        C: GattCallback + 'static,
    {
        *self.shared.callback.write() = Arc::new(callback);
    }

    /// Get the current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.connection_state().is_connected()
    }

    /// Address of the device the session holds a connection to.
    pub fn connected_address(&self) -> Option<String> {
        self.shared
            .connection
            .read()
            .as_ref()
            .map(|c| c.address.clone())
    }

    /// Subscribe to connection state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Register a callback for connection state changes.
    pub fn on_state_changed<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&ConnectionState) + Send + Sync + 'static,
    {
        self.shared.state.on_change(callback)
    }

    /// Open a connection to `peripheral`.
    ///
    /// Returns once the connection attempt has started; progress is reported
    /// to the callback. Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyConnected`] if the session still holds a
    /// connection. Call [`disconnect`](Self::disconnect) first.
    pub fn connect(&self, peripheral: &PeripheralDescriptor) -> Result<()> {
        let generation = {
            let mut connection = self.shared.connection.write();
            if let Some(active) = connection.as_ref() {
                return Err(Error::AlreadyConnected {
                    address: active.address.clone(),
                });
            }

            let generation = self.shared.generation_counter.fetch_add(1, Ordering::SeqCst) + 1;
            *connection = Some(ActiveConnection {
                generation,
                address: peripheral.address().to_string(),
                link: peripheral.link(),
            });
            self.shared.set_state(ConnectionState::Connecting);
            generation
        };

        info!("Connecting to {}", peripheral);

        tokio::spawn(Self::run_connection(
            self.shared.clone(),
            generation,
            peripheral.link(),
        ));

        Ok(())
    }

    /// Close the connection and release the handle.
    ///
    /// Does nothing if the session is not connected. Events still in flight
    /// for the closed connection are discarded.
    pub async fn disconnect(&self) -> Result<()> {
        let active = {
            let mut connection = self.shared.connection.write();
            let active = connection.take();
            if active.is_some() {
                self.shared.set_state(ConnectionState::Disconnecting);
            }
            active
        };
        let Some(active) = active else {
            debug!("Not connected, ignoring disconnect request");
            return Ok(());
        };

        info!("Disconnecting from {}", active.address);

        let result = active.link.disconnect().await;

        // A new connection may have started while the link was closing.
        {
            let connection = self.shared.connection.read();
            if connection.is_none() {
                self.shared.set_state(ConnectionState::Disconnected);
            }
        }

        if let Err(ref e) = result {
            error!("Failed to disconnect: {}", e);
        }
        result
    }

    /// Read the heart rate measurement on demand.
    ///
    /// The value is delivered to the callback like a notification. Only
    /// devices that allow reads of the measurement characteristic answer.
    pub async fn request_read(&self) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let (generation, link) = {
            let connection = self.shared.connection.read();
            match connection.as_ref() {
                Some(active) => (active.generation, active.link.clone()),
                None => return Err(Error::NotConnected),
            }
        };

        let value = link
            .read(HEART_RATE_SERVICE_UUID, HEART_RATE_MEASUREMENT_UUID)
            .await?;

        if self.shared.is_current(generation) {
            self.shared
                .callback()
                .on_characteristic_changed(HEART_RATE_MEASUREMENT_UUID, &value);
        }

        Ok(())
    }

    /// Event task for one connection.
    async fn run_connection(shared: Arc<Shared>, generation: u64, link: Arc<dyn GattLink>) {
        if let Err(e) = link.connect().await {
            warn!("Connection failed: {}", e);
            if shared.release(generation) {
                shared
                    .callback()
                    .on_connection_state_changed(&*link, ConnectionState::Disconnected)
                    .await;
            }
            return;
        }

        if !shared.set_state_if_current(generation, ConnectionState::Connected) {
            debug!("Connection completed after disconnect, ignoring");
            return;
        }

        info!("Connection established");
        shared
            .callback()
            .on_connection_state_changed(&*link, ConnectionState::Connected)
            .await;

        let mut notifications = match link.notifications().await {
            Ok(stream) => stream,
            Err(e) => {
                error!("Failed to get notifications stream: {}", e);
                if shared.release(generation) {
                    if let Err(e) = link.disconnect().await {
                        warn!("Failed to disconnect: {}", e);
                    }
                    shared
                        .callback()
                        .on_connection_state_changed(&*link, ConnectionState::Disconnected)
                        .await;
                }
                return;
            }
        };

        let discovered = link.discover_services().await;
        if !shared.is_current(generation) {
            debug!("Service discovery completed after disconnect, ignoring");
            return;
        }

        match &discovered {
            Ok(services) => debug!("Discovered {} services", services.len()),
            Err(e) => warn!("Service discovery failed: {}", e),
        }
        shared
            .callback()
            .on_services_discovered(&*link, discovered.as_deref())
            .await;

        while let Some(notification) = notifications.next().await {
            if !shared.is_current(generation) {
                debug!("Dropping notification for a closed connection");
                return;
            }

            trace!(
                "Notification from {}: {:02X?}",
                notification.characteristic,
                notification.value
            );
            shared
                .callback()
                .on_characteristic_changed(notification.characteristic, &notification.value);
        }

        if shared.release(generation) {
            info!("Connection lost");
            shared
                .callback()
                .on_connection_state_changed(&*link, ConnectionState::Disconnected)
                .await;
        }
    }
}

impl Drop for GattSession {
    fn drop(&mut self) {
        let Some(active) = self.shared.connection.write().take() else {
            return;
        };

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = active.link.disconnect().await {
                    warn!("Failed to disconnect dropped session: {}", e);
                }
            });
        }
    }
}
