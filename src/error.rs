//! Error types for the hrm-rust-ble crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// Operation requires a connection but the session is not connected.
    #[error("Device not connected")]
    NotConnected,

    /// The session already holds a connection; disconnect it first.
    #[error("Session already connected to {address}")]
    AlreadyConnected {
        /// Address of the device the session is connected to.
        address: String,
    },

    /// Failed to establish a connection to the device.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// Invalid data was received from the device.
    #[error("Invalid data received: {context}")]
    InvalidData {
        /// Description of what was invalid about the data.
        context: String,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// Service not found on the device.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The UUID of the service that was not found.
        uuid: String,
    },
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::AlreadyConnected {
            address: "AA:BB:CC:DD:EE:FF".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Session already connected to AA:BB:CC:DD:EE:FF"
        );

        let err = Error::InvalidData {
            context: "empty payload".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid data received: empty payload");
    }
}
