//! BlueZ D-Bus backend.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.
//!
//! BlueZ reports a device only the first time it appears in the adapter's
//! device table, even with duplicate data enabled. Each processed device is
//! therefore removed again through [`Discovery::remove_device`] so that its
//! next advertisement produces a fresh event.

use super::{
    DeviceProperties, DevicePath, Discovery, DiscoveryError, EVENT_CHANNEL_BUFFER_SIZE,
    InterfacesAdded, Scan, ScanError,
};
use crate::mac_address::MacAddress;
use bluer::{
    Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, ErrorKind, Session,
};
use futures::future::BoxFuture;
use futures::{StreamExt, pin_mut};
use std::sync::Arc;
use tokio::sync::{Notify, mpsc};
use tracing::{debug, trace, warn};

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// Discovery handle for a BlueZ adapter.
#[derive(Debug, Clone)]
pub struct BluezDiscovery {
    adapter: Adapter,
    stop: Arc<Notify>,
}

impl Discovery for BluezDiscovery {
    fn remove_device<'a>(
        &'a self,
        path: &'a DevicePath,
    ) -> BoxFuture<'a, Result<(), DiscoveryError>> {
        Box::pin(async move {
            let address = path
                .address()
                .map_err(|e| DiscoveryError::Bluetooth(format!("{path}: {e}")))?;
            self.adapter
                .remove_device(address.into())
                .await
                .map_err(|e| match e.kind {
                    ErrorKind::DoesNotExist | ErrorKind::NotFound => {
                        DiscoveryError::NotFound(path.clone())
                    }
                    _ => DiscoveryError::Bluetooth(e.to_string()),
                })
        })
    }

    fn stop_discovery(&self) -> BoxFuture<'_, Result<(), DiscoveryError>> {
        Box::pin(async move {
            self.stop.notify_one();
            Ok(())
        })
    }
}

/// Start LE discovery with duplicate reporting enabled.
///
/// Discovered devices are forwarded as [`InterfacesAdded`] events until
/// [`Discovery::stop_discovery`] is called, at which point the discovery
/// session is dropped and the event channel closes.
pub async fn start_scan(adapter_name: Option<&str>) -> Result<Scan, ScanError> {
    let session = Session::new().await?;
    let adapter = match adapter_name {
        Some(name) => session.adapter(name)?,
        None => session.default_adapter().await?,
    };
    adapter.set_powered(true).await?;
    adapter
        .set_discovery_filter(DiscoveryFilter {
            transport: DiscoveryTransport::Le,
            duplicate_data: false,
            ..Default::default()
        })
        .await?;

    let device_events = adapter.discover_devices().await?;
    debug!(adapter = adapter.name(), "discovery started");

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_BUFFER_SIZE);
    let stop = Arc::new(Notify::new());
    let discovery = BluezDiscovery {
        adapter: adapter.clone(),
        stop: Arc::clone(&stop),
    };

    // The task owns the session and the discovery stream; dropping them ends discovery.
    tokio::spawn(async move {
        let _session = session;
        pin_mut!(device_events);

        loop {
            tokio::select! {
                _ = stop.notified() => break,
                event = device_events.next() => match event {
                    Some(AdapterEvent::DeviceAdded(address)) => {
                        match read_device(&adapter, address).await {
                            Ok(event) => {
                                if tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!(%address, error = %e, "failed to read device properties")
                            }
                        }
                    }
                    Some(other) => trace!(?other, "ignoring adapter event"),
                    None => break,
                },
            }
        }

        debug!(adapter = adapter.name(), "discovery stopped");
    });

    Ok(Scan {
        events: rx,
        discovery: Box::new(discovery),
    })
}

async fn read_device(adapter: &Adapter, address: Address) -> bluer::Result<InterfacesAdded> {
    let device = adapter.device(address)?;
    let mac: MacAddress = address.into();

    let properties = DeviceProperties {
        address: mac.to_string(),
        rssi: device.rssi().await?,
        manufacturer_data: device.manufacturer_data().await?.unwrap_or_default(),
    };

    Ok(InterfacesAdded::device(
        DevicePath::for_device(adapter.name(), mac),
        properties,
    ))
}
