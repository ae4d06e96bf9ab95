//! Advertisement routing.
//!
//! Each discovery event is filtered to Bluetooth device objects, matched
//! against the registry, decoded with the device's packet format and handed
//! to the sink. Whatever the outcome, the device is retired afterwards so the
//! discovery subsystem reports its next advertisement again.

use crate::decoder::{DecodeError, GOVEE_MANUFACTURER_ID, decode_for_device};
use crate::dedup::DedupTracker;
use crate::registry::DeviceRegistry;
use crate::scanner::{Discovery, InterfacesAdded};
use crate::sink::ReadingSink;
use chrono::{DateTime, Utc};
use tracing::{debug, trace, warn};

/// How a single event was handled.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    /// The event did not carry the Bluetooth device interface
    NotADevice,
    /// The address is not in the registry
    UnknownDevice,
    /// The advertisement had no payload under the Govee manufacturer id
    UnsupportedVendorKey,
    /// The payload could not be decoded for the registered device type
    Malformed(DecodeError),
    /// A reading was decoded and every sink effect succeeded
    Emitted,
    /// A reading was decoded but at least one sink effect failed
    SinkFailed,
}

/// Routes discovery events to the decoder and sink.
pub struct Router<'a> {
    registry: DeviceRegistry,
    discovery: &'a dyn Discovery,
    sink: &'a dyn ReadingSink,
    tracker: DedupTracker,
}

impl<'a> Router<'a> {
    pub fn new(
        registry: DeviceRegistry,
        discovery: &'a dyn Discovery,
        sink: &'a dyn ReadingSink,
    ) -> Self {
        Self {
            registry,
            discovery,
            sink,
            tracker: DedupTracker::new(),
        }
    }

    /// Number of handles still awaiting retirement; zero between events.
    pub fn pending_retirements(&self) -> usize {
        self.tracker.pending()
    }

    /// Route one event, timestamping any reading with the current time.
    pub async fn route(&mut self, event: InterfacesAdded) -> RouteOutcome {
        self.route_at(event, Utc::now()).await
    }

    pub async fn route_at(&mut self, event: InterfacesAdded, now: DateTime<Utc>) -> RouteOutcome {
        let Some(properties) = event.device_properties() else {
            trace!(path = %event.path, "not a device object");
            return RouteOutcome::NotADevice;
        };

        let outcome = match self.registry.lookup(&properties.address) {
            None => {
                trace!(address = %properties.address, "ignoring unregistered device");
                RouteOutcome::UnknownDevice
            }
            Some(device) => match properties.manufacturer_data.get(&GOVEE_MANUFACTURER_ID) {
                None => {
                    trace!(device_id = %device.device_id, "no Govee manufacturer data");
                    RouteOutcome::UnsupportedVendorKey
                }
                Some(data) => match decode_for_device(device, data, now) {
                    Ok(reading) => match self.sink.emit(&reading).await {
                        Ok(()) => RouteOutcome::Emitted,
                        Err(e) => {
                            debug!(device_id = %device.device_id, error = %e, "reading partially delivered");
                            RouteOutcome::SinkFailed
                        }
                    },
                    Err(e) => {
                        warn!(
                            device_id = %device.device_id,
                            address = %device.address,
                            rssi = ?properties.rssi,
                            error = %e,
                            "dropping advertisement"
                        );
                        RouteOutcome::Malformed(e)
                    }
                },
            },
        };

        self.tracker.track(event.path);
        self.tracker.retire_pending(self.discovery).await;

        outcome
    }
}
