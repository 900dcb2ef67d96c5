//! Discovered peripherals.

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

use crate::ble::gatt::GattLink;

/// A peripheral seen during discovery.
///
/// Identity is the address: two descriptors with the same address are equal
/// regardless of name or signal strength.
#[derive(Clone)]
pub struct PeripheralDescriptor {
    address: String,
    name: Option<String>,
    rssi: Option<i16>,
    first_seen: DateTime<Utc>,
    link: Arc<dyn GattLink>,
}

impl PeripheralDescriptor {
    /// Create a descriptor for a peripheral sighted now.
    pub fn new(
        address: impl Into<String>,
        name: Option<String>,
        rssi: Option<i16>,
        link: Arc<dyn GattLink>,
    ) -> Self {
        Self {
            address: address.into(),
            name,
            rssi,
            first_seen: Utc::now(),
            link,
        }
    }

    /// Bluetooth address, or the platform identifier where the address is hidden.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Advertised local name.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name if advertised, otherwise the address.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.address)
    }

    /// Signal strength in dBm at first sighting.
    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    /// When the peripheral was first seen in the current scan cycle.
    pub fn first_seen(&self) -> DateTime<Utc> {
        self.first_seen
    }

    pub(crate) fn link(&self) -> Arc<dyn GattLink> {
        self.link.clone()
    }
}

impl PartialEq for PeripheralDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for PeripheralDescriptor {}

impl fmt::Debug for PeripheralDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeripheralDescriptor")
            .field("address", &self.address)
            .field("name", &self.name)
            .field("rssi", &self.rssi)
            .field("first_seen", &self.first_seen)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for PeripheralDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.address),
            None => write!(f, "{}", self.address),
        }
    }
}
