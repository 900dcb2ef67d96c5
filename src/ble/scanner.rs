//! BLE discovery.
//!
//! Provides the scanner for discovering nearby peripherals. Discovery runs in
//! cycles: each cycle clears the device list, scans for the configured
//! window, stops, and restarts after the configured delay.

use futures::stream::{BoxStream, StreamExt};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use crate::ble::callback::GattCallback;
use crate::ble::peripheral::PeripheralDescriptor;
use crate::ble::radio::{BleRadio, BtleplugRadio, RadioState};
use crate::ble::session::GattSession;
use crate::error::Result;
use crate::observable::{CallbackHandle, Observable};

/// Outcome of a discovery request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ScanState {
    /// No discovery running.
    #[default]
    Idle,
    /// Discovery cycles are running.
    Scanning,
    /// The radio does not support Bluetooth Low Energy.
    Unsupported,
    /// The radio is off or unavailable.
    Disabled,
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Unsupported => write!(f, "Unsupported"),
            Self::Disabled => write!(f, "Disabled"),
        }
    }
}

/// Discovery timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScanConfig {
    /// How long each scan cycle listens for advertisements.
    pub scan_window: Duration,
    /// Pause between the end of one cycle and the start of the next.
    pub restart_delay: Duration,
}

impl ScanConfig {
    /// Default scan window (10 seconds).
    pub const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(10);

    /// Set the scan window.
    pub fn with_scan_window(mut self, scan_window: Duration) -> Self {
        self.scan_window = scan_window;
        self
    }

    /// Set the restart delay.
    pub fn with_restart_delay(mut self, restart_delay: Duration) -> Self {
        self.restart_delay = restart_delay;
        self
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            scan_window: Self::DEFAULT_SCAN_WINDOW,
            restart_delay: Duration::ZERO,
        }
    }
}

/// Lifecycle of the cycle task.
enum ScanTask {
    Idle,
    /// A start request holds the slot while it checks the radio.
    Starting(u64),
    Running(JoinHandle<()>),
}

/// Scanner for discovering nearby BLE peripherals.
pub struct DeviceScanner {
    /// The radio to scan with.
    radio: Arc<dyn BleRadio>,
    /// Discovery timing.
    config: ScanConfig,
    /// Peripherals seen in the current cycle, in order of first sighting.
    devices: Observable<Vec<PeripheralDescriptor>>,
    /// Whether discovery is running.
    scanning: Observable<bool>,
    /// Cycle task slot.
    scan_task: Mutex<ScanTask>,
    /// Identifies start requests so a stale one cannot claim the slot.
    start_counter: AtomicU64,
}

impl DeviceScanner {
    /// Create a scanner on the first Bluetooth adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        Self::with_config(ScanConfig::default()).await
    }

    /// Create a scanner on the first Bluetooth adapter with custom timing.
    pub async fn with_config(config: ScanConfig) -> Result<Self> {
        let radio = BtleplugRadio::new().await?;
        Ok(Self::with_radio(Arc::new(radio), config))
    }

    /// Create a scanner on a specific radio.
    pub fn with_radio(radio: Arc<dyn BleRadio>, config: ScanConfig) -> Self {
        Self {
            radio,
            config,
            devices: Observable::new(Vec::new()),
            scanning: Observable::new(false),
            scan_task: Mutex::new(ScanTask::Idle),
            start_counter: AtomicU64::new(0),
        }
    }

    /// Get the discovery timing.
    pub fn config(&self) -> ScanConfig {
        self.config
    }

    /// Start discovery.
    ///
    /// Returns [`ScanState::Disabled`] or [`ScanState::Unsupported`] without
    /// scanning when the radio cannot be used. Calling this while already
    /// scanning returns [`ScanState::Scanning`] and changes nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the first scan cannot be started.
    pub async fn start_discovery(&self) -> Result<ScanState> {
        let ticket = {
            let mut task = self.scan_task.lock();
            match &*task {
                ScanTask::Starting(_) => {
                    debug!("Discovery already starting, ignoring start request");
                    return Ok(ScanState::Scanning);
                }
                ScanTask::Running(handle) if !handle.is_finished() => {
                    debug!("Already scanning, ignoring start request");
                    return Ok(ScanState::Scanning);
                }
                _ => {}
            }
            let ticket = self.start_counter.fetch_add(1, Ordering::SeqCst) + 1;
            *task = ScanTask::Starting(ticket);
            ticket
        };

        let radio_state = self.radio.state().await.unwrap_or_else(|e| {
            warn!("Failed to query radio state: {}", e);
            RadioState::PoweredOff
        });

        match radio_state {
            RadioState::PoweredOn => {}
            RadioState::PoweredOff => {
                warn!("Bluetooth is disabled, not starting discovery");
                self.abandon_start(ticket);
                return Ok(ScanState::Disabled);
            }
            RadioState::Unsupported => {
                warn!("Bluetooth LE is not supported, not starting discovery");
                self.abandon_start(ticket);
                return Ok(ScanState::Unsupported);
            }
        }

        info!("Starting BLE discovery");

        let discoveries = match Self::begin_cycle(self.radio.as_ref(), &self.devices).await {
            Ok(discoveries) => discoveries,
            Err(e) => {
                self.abandon_start(ticket);
                return Err(e);
            }
        };

        let handle = tokio::spawn(Self::run_cycles(
            self.radio.clone(),
            self.config,
            self.devices.clone(),
            self.scanning.clone(),
            discoveries,
        ));

        {
            let mut task = self.scan_task.lock();
            if matches!(*task, ScanTask::Starting(t) if t == ticket) {
                self.scanning.set(true);
                *task = ScanTask::Running(handle);
                return Ok(ScanState::Scanning);
            }
        }

        // Stopped while the first scan was starting.
        debug!("Discovery stopped during start, discarding scan");
        handle.abort();
        let _ = handle.await;
        self.radio.stop_scan().await?;

        Ok(ScanState::Idle)
    }

    /// Stop discovery. Safe to call when not scanning.
    pub async fn stop_discovery(&self) -> Result<()> {
        let task = {
            let mut slot = self.scan_task.lock();
            self.scanning.set(false);
            std::mem::replace(&mut *slot, ScanTask::Idle)
        };

        let handle = match task {
            ScanTask::Running(handle) => handle,
            ScanTask::Starting(_) => {
                debug!("Cancelling discovery that is still starting");
                return Ok(());
            }
            ScanTask::Idle => {
                debug!("Not scanning, ignoring stop request");
                return Ok(());
            }
        };

        info!("Stopping BLE discovery");

        handle.abort();
        let _ = handle.await;

        self.radio.stop_scan().await?;

        Ok(())
    }

    /// Release the slot if `ticket` still holds it.
    fn abandon_start(&self, ticket: u64) {
        let mut task = self.scan_task.lock();
        if matches!(*task, ScanTask::Starting(t) if t == ticket) {
            *task = ScanTask::Idle;
        }
    }

    /// Check if currently scanning.
    pub fn is_scanning(&self) -> bool {
        self.scanning.get()
    }

    /// Current discovery state: [`ScanState::Scanning`] or [`ScanState::Idle`].
    pub fn state(&self) -> ScanState {
        if self.is_scanning() {
            ScanState::Scanning
        } else {
            ScanState::Idle
        }
    }

    /// Peripherals seen in the current cycle.
    pub fn devices(&self) -> Vec<PeripheralDescriptor> {
        self.devices.get()
    }

    /// Subscribe to the device list.
    ///
    /// The list is emptied at the start of every cycle.
    pub fn subscribe_devices(&self) -> watch::Receiver<Vec<PeripheralDescriptor>> {
        self.devices.subscribe()
    }

    /// Subscribe to the scanning flag.
    pub fn subscribe_scanning(&self) -> watch::Receiver<bool> {
        self.scanning.subscribe()
    }

    /// Register a callback for device list changes.
    pub fn on_devices_changed<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&Vec<PeripheralDescriptor>) + Send + Sync + 'static,
    {
        self.devices.on_change(callback)
    }

    /// Register a callback for scanning flag changes.
    pub fn on_scanning_changed<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.scanning.on_change(callback)
    }

    /// Open a session to a discovered peripheral.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be started.
    pub fn connect<C>(&self, peripheral: &PeripheralDescriptor, callback: C) -> Result<GattSession>
    where
        C: GattCallback + 'static,
    {
        let session = GattSession::new(callback);
        session.connect(peripheral)?;
        Ok(session)
    }

    /// Clear the list and start one scan.
    async fn begin_cycle(
        radio: &dyn BleRadio,
        devices: &Observable<Vec<PeripheralDescriptor>>,
    ) -> Result<BoxStream<'static, PeripheralDescriptor>> {
        devices.set(Vec::new());
        let discoveries = radio.discoveries().await?;
        radio.start_scan().await?;
        Ok(discoveries)
    }

    /// Cycle task: runs until aborted or a scan fails to restart.
    async fn run_cycles(
        radio: Arc<dyn BleRadio>,
        config: ScanConfig,
        devices: Observable<Vec<PeripheralDescriptor>>,
        scanning: Observable<bool>,
        mut discoveries: BoxStream<'static, PeripheralDescriptor>,
    ) {
        loop {
            Self::collect(&mut discoveries, &devices, config.scan_window).await;

            if let Err(e) = radio.stop_scan().await {
                warn!("Failed to stop scan at end of cycle: {}", e);
            }

            tokio::time::sleep(config.restart_delay).await;

            discoveries = match Self::begin_cycle(radio.as_ref(), &devices).await {
                Ok(discoveries) => discoveries,
                Err(e) => {
                    error!("Failed to restart discovery: {}", e);
                    break;
                }
            };
            trace!("Scan cycle restarted");
        }

        scanning.set(false);
        debug!("Discovery task ended");
    }

    /// Record sightings until the scan window closes.
    async fn collect(
        discoveries: &mut BoxStream<'static, PeripheralDescriptor>,
        devices: &Observable<Vec<PeripheralDescriptor>>,
        scan_window: Duration,
    ) {
        let window = tokio::time::sleep(scan_window);
        tokio::pin!(window);

        loop {
            tokio::select! {
                _ = &mut window => break,
                next = discoveries.next() => match next {
                    Some(peripheral) => {
                        devices.modify(|list| record_discovery(list, peripheral));
                    }
                    None => {
                        debug!("Discovery stream ended before the scan window closed");
                        (&mut window).await;
                        break;
                    }
                }
            }
        }
    }
}

/// Append `peripheral` unless its address is already listed.
fn record_discovery(list: &mut Vec<PeripheralDescriptor>, peripheral: PeripheralDescriptor) -> bool {
    if list.iter().any(|known| known.address() == peripheral.address()) {
        return false;
    }

    debug!("Discovered {}", peripheral);
    list.push(peripheral);
    true
}

impl Drop for DeviceScanner {
    fn drop(&mut self) {
        let ScanTask::Running(handle) = std::mem::replace(self.scan_task.get_mut(), ScanTask::Idle)
        else {
            return;
        };
        handle.abort();

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let radio = self.radio.clone();
            runtime.spawn(async move {
                if let Err(e) = radio.stop_scan().await {
                    warn!("Failed to stop scan for dropped scanner: {}", e);
                }
            });
        }
    }
}
