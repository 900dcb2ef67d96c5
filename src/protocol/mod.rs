//! Protocol module for parsing characteristic payloads.
//!
//! This module contains the Heart Rate Measurement decoder.

pub mod heart_rate;

pub use heart_rate::{decode_bpm, HeartRateMeasurement};
