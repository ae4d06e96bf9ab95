//! Static registry of known sensors.
//!
//! The registry maps a lowercase MAC address to the sensor's packet format and
//! the label used for log rows and MQTT topics. It is built once at startup and
//! never mutated afterwards.

use crate::mac_address::{MacAddress, ParseMacError};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Packet format of a registered sensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum DeviceType {
    /// Govee H5074: little-endian temperature/humidity in hundredths.
    H5074,
    /// Govee H5075: 24-bit big-endian packed temperature/humidity.
    H5075,
    /// Any other name found in configuration. Kept so the device can be reported
    /// instead of silently ignored.
    Unsupported(String),
}

impl From<String> for DeviceType {
    fn from(name: String) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "H5074" => DeviceType::H5074,
            "H5075" => DeviceType::H5075,
            _ => DeviceType::Unsupported(name),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceType::H5074 => write!(f, "H5074"),
            DeviceType::H5075 => write!(f, "H5075"),
            DeviceType::Unsupported(name) => write!(f, "{name}"),
        }
    }
}

/// A registered sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    /// Lowercase `aa:bb:cc:dd:ee:ff` address.
    pub address: String,
    pub device_type: DeviceType,
    pub device_id: String,
}

impl DeviceRecord {
    /// Build a record, validating and normalizing `address`.
    pub fn new(
        address: &str,
        device_type: DeviceType,
        device_id: impl Into<String>,
    ) -> Result<Self, RegistryError> {
        let mac: MacAddress = address
            .parse()
            .map_err(|source| RegistryError::InvalidAddress {
                address: address.to_string(),
                source,
            })?;

        Ok(Self {
            address: mac.to_string(),
            device_type,
            device_id: device_id.into(),
        })
    }
}

/// Errors raised while building the registry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("device address '{address}' is invalid: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: ParseMacError,
    },
    #[error("device address '{0}' is registered more than once")]
    DuplicateAddress(String),
}

/// Lookup table from address to [`DeviceRecord`].
#[derive(Debug, Clone, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceRecord>,
}

impl DeviceRegistry {
    /// Build a registry, rejecting two records for the same address.
    pub fn from_records(
        records: impl IntoIterator<Item = DeviceRecord>,
    ) -> Result<Self, RegistryError> {
        let mut devices = HashMap::new();
        for record in records {
            if devices.contains_key(&record.address) {
                return Err(RegistryError::DuplicateAddress(record.address));
            }
            devices.insert(record.address.clone(), record);
        }
        Ok(Self { devices })
    }

    /// Find the record for `address`. Comparison ignores case.
    pub fn lookup(&self, address: &str) -> Option<&DeviceRecord> {
        self.devices.get(&normalize_address(address))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

fn normalize_address(address: &str) -> String {
    address.trim().to_ascii_lowercase()
}
