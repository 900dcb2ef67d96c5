//! Heart Rate Measurement parsing.
//!
//! Parses notifications from the Heart Rate Measurement characteristic
//! (0x2A37) as laid out by the Bluetooth SIG Heart Rate Service.

use crate::error::{Error, Result};

/// Flags bit 0: heart rate value is a uint16 instead of a uint8.
const FLAG_VALUE_FORMAT_U16: u8 = 0x01;
/// Flags bit 1: skin contact detected.
const FLAG_SENSOR_CONTACT_DETECTED: u8 = 0x02;
/// Flags bit 2: sensor contact feature supported.
const FLAG_SENSOR_CONTACT_SUPPORTED: u8 = 0x04;
/// Flags bit 3: energy expended field present.
const FLAG_ENERGY_EXPENDED_PRESENT: u8 = 0x08;
/// Flags bit 4: one or more RR-interval values present.
const FLAG_RR_INTERVAL_PRESENT: u8 = 0x10;

/// A decoded heart rate measurement.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeartRateMeasurement {
    /// Heart rate in beats per minute.
    pub bpm: u16,
    /// Skin contact state, if the sensor supports contact detection.
    pub sensor_contact: Option<bool>,
    /// Accumulated energy expended in kilojoules.
    pub energy_expended: Option<u16>,
    /// RR-intervals in units of 1/1024 second.
    pub rr_intervals: Vec<u16>,
}

impl HeartRateMeasurement {
    /// Parse a heart rate measurement from notification data.
    ///
    /// Packet layout:
    /// - Byte 0: Flags
    /// - Byte 1 (uint8) or Bytes 1-2 (uint16 little-endian): Heart rate
    /// - Next 2 bytes: Energy expended (if flags bit 3)
    /// - Remaining pairs: RR-intervals (if flags bit 4)
    ///
    /// Only the heart rate value is required. Optional trailing fields that
    /// are cut short are ignored.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let flags = *data.first().ok_or_else(|| Error::InvalidData {
            context: "Heart rate measurement is empty".to_string(),
        })?;

        let (bpm, mut offset) = if flags & FLAG_VALUE_FORMAT_U16 != 0 {
            let bytes = data.get(1..3).ok_or_else(|| Error::InvalidData {
                context: format!(
                    "Heart rate measurement too short for uint16 value: {} bytes",
                    data.len()
                ),
            })?;
            (u16::from_le_bytes([bytes[0], bytes[1]]), 3)
        } else {
            let byte = *data.get(1).ok_or_else(|| Error::InvalidData {
                context: format!(
                    "Heart rate measurement too short for uint8 value: {} bytes",
                    data.len()
                ),
            })?;
            (u16::from(byte), 2)
        };

        let sensor_contact = (flags & FLAG_SENSOR_CONTACT_SUPPORTED != 0)
            .then_some(flags & FLAG_SENSOR_CONTACT_DETECTED != 0);

        let mut energy_expended = None;
        if flags & FLAG_ENERGY_EXPENDED_PRESENT != 0 {
            if let Some(bytes) = data.get(offset..offset + 2) {
                energy_expended = Some(u16::from_le_bytes([bytes[0], bytes[1]]));
            }
            offset += 2;
        }

        let rr_intervals = if flags & FLAG_RR_INTERVAL_PRESENT != 0 {
            data.get(offset..)
                .unwrap_or_default()
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect()
        } else {
            Vec::new()
        };

        Ok(Self {
            bpm,
            sensor_contact,
            energy_expended,
            rr_intervals,
        })
    }

    /// RR-intervals converted to milliseconds.
    pub fn rr_intervals_ms(&self) -> Vec<f64> {
        self.rr_intervals
            .iter()
            .map(|&rr| f64::from(rr) * 1000.0 / 1024.0)
            .collect()
    }
}

/// Decode only the beats-per-minute value of a measurement.
pub fn decode_bpm(data: &[u8]) -> Result<u16> {
    HeartRateMeasurement::parse(data).map(|m| m.bpm)
}
