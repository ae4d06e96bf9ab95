//! Govee H5074 / H5075 advertisement decoders.
//!
//! Both sensors tag their payload with manufacturer id `0xEC88`. The first byte
//! of the payload is a header and carries no measurement.

use crate::reading::DecodedReading;
use crate::registry::{DeviceRecord, DeviceType};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Manufacturer id under which Govee thermometers publish their payload (60552).
pub const GOVEE_MANUFACTURER_ID: u16 = 0xEC88;

/// Minimum payload length for the H5074 format.
pub const H5074_PAYLOAD_LENGTH: usize = 6;

/// Minimum payload length for the H5075 format.
pub const H5075_PAYLOAD_LENGTH: usize = 5;

const H5075_SIGN_BIT: u32 = 0x80_0000;

/// Errors produced while decoding a payload for a registered device.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Payload too short for the device's declared format
    #[error("Malformed {device_type} payload: expected at least {expected} bytes, got {actual}")]
    MalformedPayload {
        device_type: DeviceType,
        expected: usize,
        actual: usize,
    },
    /// Registry entry names a format this decoder does not know
    #[error("Unsupported device type: {0}")]
    UnsupportedDeviceType(String),
}

/// Calibrated values from one payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub battery_pct: u8,
}

impl Sample {
    /// Attach the device label and timestamp.
    pub fn into_reading(self, device_id: &str, timestamp: DateTime<Utc>) -> DecodedReading {
        DecodedReading {
            device_id: device_id.to_string(),
            timestamp,
            temperature_c: self.temperature_c,
            humidity_pct: self.humidity_pct,
            battery_pct: self.battery_pct,
        }
    }
}

/// Decode `data` using the format declared for `device`.
///
/// `data` is the value stored under [`GOVEE_MANUFACTURER_ID`] in the
/// advertisement's manufacturer data.
pub fn decode_for_device(
    device: &DeviceRecord,
    data: &[u8],
    timestamp: DateTime<Utc>,
) -> Result<DecodedReading, DecodeError> {
    let sample = decode_sample(&device.device_type, data)?;
    Ok(sample.into_reading(&device.device_id, timestamp))
}

/// Dispatch on `device_type`.
pub fn decode_sample(device_type: &DeviceType, data: &[u8]) -> Result<Sample, DecodeError> {
    match device_type {
        DeviceType::H5074 => decode_h5074(data),
        DeviceType::H5075 => decode_h5075(data),
        DeviceType::Unsupported(name) => Err(DecodeError::UnsupportedDeviceType(name.clone())),
    }
}

/// Decode an H5074 payload.
///
/// Layout after the header byte: temperature `u16` LE (0.01 °C), humidity
/// `u16` LE (0.01 %RH), battery `u8` (%).
pub fn decode_h5074(data: &[u8]) -> Result<Sample, DecodeError> {
    check_length(DeviceType::H5074, H5074_PAYLOAD_LENGTH, data)?;

    let temp_raw = u16::from_le_bytes([data[1], data[2]]);
    let hum_raw = u16::from_le_bytes([data[3], data[4]]);

    Ok(Sample {
        temperature_c: f64::from(temp_raw) / 100.0,
        humidity_pct: f64::from(hum_raw) / 100.0,
        battery_pct: data[5],
    })
}

/// Decode an H5075 payload.
///
/// Bytes 1..4 are one 24-bit big-endian value. Temperature is that value in
/// 0.0001 °C with bit 23 as a sign flag (sign-magnitude, not two's
/// complement). Humidity is the value's last three decimal digits in 0.1 %RH,
/// taken before the sign bit is cleared. Byte 4 is battery (%).
pub fn decode_h5075(data: &[u8]) -> Result<Sample, DecodeError> {
    check_length(DeviceType::H5075, H5075_PAYLOAD_LENGTH, data)?;

    let packed = u32::from_be_bytes([0, data[1], data[2], data[3]]);

    Ok(Sample {
        temperature_c: h5075_temperature(packed),
        humidity_pct: f64::from(packed % 1000) / 10.0,
        battery_pct: data[4],
    })
}

fn h5075_temperature(packed: u32) -> f64 {
    if packed & H5075_SIGN_BIT != 0 {
        -(f64::from(packed ^ H5075_SIGN_BIT) / 10000.0)
    } else {
        f64::from(packed) / 10000.0
    }
}

fn check_length(device_type: DeviceType, expected: usize, data: &[u8]) -> Result<(), DecodeError> {
    if data.len() < expected {
        return Err(DecodeError::MalformedPayload {
            device_type,
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}
