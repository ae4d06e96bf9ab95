//! Discovery-subsystem boundary.
//!
//! The router never talks to BlueZ directly. A [`Scanner`] starts discovery and
//! hands back a stream of [`InterfacesAdded`] events together with a
//! [`Discovery`] handle used to retire devices and stop the scan. This keeps the
//! routing logic testable without Bluetooth hardware.

#[cfg(feature = "bluer")]
pub mod bluer;

use crate::mac_address::{MacAddress, ParseMacError};
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;
use tokio::sync::mpsc;

/// BlueZ interface name carried by device objects.
pub const DEVICE_INTERFACE: &str = "org.bluez.Device1";

/// Channel buffer size for discovery events.
pub const EVENT_CHANNEL_BUFFER_SIZE: usize = 100;

/// Opaque handle of a discovered device, scoped to the current discovery session.
///
/// For BlueZ this is the D-Bus object path, e.g. `/org/bluez/hci0/dev_A4_C1_38_E5_2F_38`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevicePath(String);

impl DevicePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Object path BlueZ assigns to `address` under `adapter`.
    pub fn for_device(adapter: &str, address: MacAddress) -> Self {
        Self(format!("/org/bluez/{adapter}/dev_{}", address.to_upper_with('_')))
    }

    /// Recover the device address from a BlueZ object path.
    pub fn address(&self) -> Result<MacAddress, ParseMacError> {
        let suffix = self
            .0
            .rsplit_once("/dev_")
            .map(|(_, suffix)| suffix)
            .unwrap_or(self.0.as_str());
        MacAddress::parse_with(suffix, '_')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DevicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Properties of the `org.bluez.Device1` interface the router needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceProperties {
    pub address: String,
    pub rssi: Option<i16>,
    /// Manufacturer id -> payload
    pub manufacturer_data: HashMap<u16, Vec<u8>>,
}

/// An "interfaces added" notification from the discovery subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct InterfacesAdded {
    pub path: DevicePath,
    /// Interface name -> properties. Only [`DEVICE_INTERFACE`] is of interest.
    pub interfaces: BTreeMap<String, DeviceProperties>,
}

impl InterfacesAdded {
    /// Event for a BLE device object.
    pub fn device(path: DevicePath, properties: DeviceProperties) -> Self {
        Self {
            path,
            interfaces: BTreeMap::from([(DEVICE_INTERFACE.to_string(), properties)]),
        }
    }

    /// The device property set, if this event describes a Bluetooth device.
    pub fn device_properties(&self) -> Option<&DeviceProperties> {
        self.interfaces.get(DEVICE_INTERFACE)
    }
}

/// Errors reported by the discovery subsystem.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DiscoveryError {
    /// The device is no longer known, e.g. it was already removed
    #[error("Device {0} not found")]
    NotFound(DevicePath),
    /// Any other Bluetooth failure
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
}

/// Error type for starting a scan.
#[derive(Error, Debug)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Backend not available (not compiled in)
    #[allow(dead_code)]
    #[error("Backend '{0}' not available (not compiled in)")]
    BackendNotAvailable(String),
}

/// Control surface of a running discovery session.
pub trait Discovery: Send + Sync {
    /// Remove a device from the subsystem's device table so it is reported again
    /// on its next advertisement.
    fn remove_device<'a>(&'a self, path: &'a DevicePath) -> BoxFuture<'a, Result<(), DiscoveryError>>;

    /// Stop the active scan. Events already queued may still be delivered.
    fn stop_discovery(&self) -> BoxFuture<'_, Result<(), DiscoveryError>>;
}

/// A running scan: discovery events plus the handle controlling them.
pub struct Scan {
    pub events: mpsc::Receiver<InterfacesAdded>,
    pub discovery: Box<dyn Discovery>,
}

impl fmt::Debug for Scan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scan").finish_non_exhaustive()
    }
}

/// Scanner abstraction to enable deterministic unit tests without Bluetooth hardware.
pub trait Scanner: Send + Sync {
    fn start_scan(&self) -> BoxFuture<'_, Result<Scan, ScanError>>;
}

/// Scanner backed by the BlueZ daemon.
#[derive(Debug, Default, Clone)]
pub struct RealScanner {
    /// Adapter name such as `hci0`; `None` selects the default adapter.
    pub adapter: Option<String>,
}

impl Scanner for RealScanner {
    fn start_scan(&self) -> BoxFuture<'_, Result<Scan, ScanError>> {
        Box::pin(async move {
            #[cfg(feature = "bluer")]
            return bluer::start_scan(self.adapter.as_deref()).await;
            #[cfg(not(feature = "bluer"))]
            return Err(ScanError::BackendNotAvailable("bluer".to_string()));
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_path_round_trip() {
        let mac: MacAddress = "a4:c1:38:e5:2f:38".parse().unwrap();
        let path = DevicePath::for_device("hci0", mac);
        assert_eq!(path.as_str(), "/org/bluez/hci0/dev_A4_C1_38_E5_2F_38");
        assert_eq!(path.address().unwrap(), mac);
    }

    #[test]
    fn test_device_path_without_device_segment() {
        assert!(DevicePath::new("/org/bluez/hci0").address().is_err());
    }

    #[test]
    fn test_device_properties_filter() {
        let event = InterfacesAdded::device(DevicePath::new("/p"), DeviceProperties::default());
        assert!(event.device_properties().is_some());

        let other = InterfacesAdded {
            path: DevicePath::new("/p"),
            interfaces: BTreeMap::from([(
                "org.bluez.Battery1".to_string(),
                DeviceProperties::default(),
            )]),
        };
        assert!(other.device_properties().is_none());
    }

    #[test]
    fn test_discovery_error_display() {
        let err = DiscoveryError::NotFound(DevicePath::new("/org/bluez/hci0/dev_X"));
        assert_eq!(format!("{}", err), "Device /org/bluez/hci0/dev_X not found");

        let err = DiscoveryError::Bluetooth("adapter off".to_string());
        assert_eq!(format!("{}", err), "Bluetooth error: adapter off");
    }

    #[test]
    fn test_scan_error_display() {
        let err = ScanError::BackendNotAvailable("bluer".to_string());
        assert_eq!(format!("{}", err), "Backend 'bluer' not available (not compiled in)");
    }
}
