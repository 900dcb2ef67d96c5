//! BLE Service and Characteristic UUIDs.
//!
//! Standard Bluetooth SIG UUIDs used for heart-rate monitoring.

use uuid::Uuid;

/// Heart Rate Service UUID (0x180D).
pub const HEART_RATE_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180d_0000_1000_8000_00805f9b34fb);
/// Heart Rate Measurement characteristic UUID (0x2A37, Notify).
pub const HEART_RATE_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a37_0000_1000_8000_00805f9b34fb);
/// Client Characteristic Configuration descriptor UUID (0x2902).
pub const CLIENT_CHARACTERISTIC_CONFIG_UUID: Uuid =
    Uuid::from_u128(0x0000_2902_0000_1000_8000_00805f9b34fb);

/// CCCD value that enables notifications.
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];

/// Check if a service UUID is the Heart Rate service.
pub fn is_heart_rate_service(uuid: &Uuid) -> bool {
    *uuid == HEART_RATE_SERVICE_UUID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        assert_eq!(
            HEART_RATE_SERVICE_UUID.to_string(),
            "0000180d-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            HEART_RATE_MEASUREMENT_UUID.to_string(),
            "00002a37-0000-1000-8000-00805f9b34fb"
        );
        assert_eq!(
            CLIENT_CHARACTERISTIC_CONFIG_UUID.to_string(),
            "00002902-0000-1000-8000-00805f9b34fb"
        );
    }

    #[test]
    fn test_is_heart_rate_service() {
        assert!(is_heart_rate_service(&HEART_RATE_SERVICE_UUID));
        assert!(!is_heart_rate_service(&HEART_RATE_MEASUREMENT_UUID));
    }
}
