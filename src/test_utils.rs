//! Fakes shared by unit tests.

use crate::mac_address::MacAddress;
use crate::reading::DecodedReading;
use crate::scanner::{
    DevicePath, DeviceProperties, Discovery, DiscoveryError, InterfacesAdded, Scan, ScanError,
    Scanner,
};
use crate::sink::mqtt::{PublishError, Publisher};
use crate::sink::{ReadingSink, SinkError, SinkFailure};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::fmt::MakeWriter;

/// Build a device event for `address` carrying the given manufacturer data.
pub fn advertisement(address: &str, manufacturer_data: &[(u16, &[u8])]) -> InterfacesAdded {
    let mac: MacAddress = address.parse().unwrap();
    InterfacesAdded::device(
        DevicePath::for_device("hci0", mac),
        DeviceProperties {
            address: address.to_string(),
            rssi: Some(-60),
            manufacturer_data: manufacturer_data
                .iter()
                .map(|(id, data)| (*id, data.to_vec()))
                .collect::<HashMap<_, _>>(),
        },
    )
}

pub fn reading_at(
    device_id: &str,
    timestamp: DateTime<Utc>,
    temperature_c: f64,
    humidity_pct: f64,
    battery_pct: u8,
) -> DecodedReading {
    DecodedReading {
        device_id: device_id.to_string(),
        timestamp,
        temperature_c,
        humidity_pct,
        battery_pct,
    }
}

#[derive(Debug, Default)]
struct DiscoveryState {
    removed: Vec<DevicePath>,
    gone: HashSet<DevicePath>,
    stop_calls: usize,
}

/// In-memory discovery subsystem.
///
/// By default every removal succeeds. `forget_removed` makes a second removal
/// of the same path fail with `NotFound`, and `failing` makes every removal
/// fail with a Bluetooth error.
#[derive(Debug, Clone, Default)]
pub struct FakeDiscovery {
    state: Arc<Mutex<DiscoveryState>>,
    forget_removed: bool,
    failing: bool,
}

impl FakeDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forget_removed(mut self) -> Self {
        self.forget_removed = true;
        self
    }

    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// Paths removed successfully, in order.
    pub fn removed(&self) -> Vec<DevicePath> {
        self.state.lock().unwrap().removed.clone()
    }

    pub fn stop_calls(&self) -> usize {
        self.state.lock().unwrap().stop_calls
    }
}

impl Discovery for FakeDiscovery {
    fn remove_device<'a>(
        &'a self,
        path: &'a DevicePath,
    ) -> BoxFuture<'a, Result<(), DiscoveryError>> {
        Box::pin(async move {
            if self.failing {
                return Err(DiscoveryError::Bluetooth("adapter unavailable".to_string()));
            }
            let mut state = self.state.lock().unwrap();
            if state.gone.contains(path) {
                return Err(DiscoveryError::NotFound(path.clone()));
            }
            if self.forget_removed {
                state.gone.insert(path.clone());
            }
            state.removed.push(path.clone());
            Ok(())
        })
    }

    fn stop_discovery(&self) -> BoxFuture<'_, Result<(), DiscoveryError>> {
        Box::pin(async move {
            self.state.lock().unwrap().stop_calls += 1;
            Ok(())
        })
    }
}

/// Scanner replaying a fixed list of events.
#[derive(Debug)]
pub struct FakeScanner {
    events: Vec<InterfacesAdded>,
    discovery: FakeDiscovery,
    keep_open: bool,
}

impl FakeScanner {
    pub fn new(events: Vec<InterfacesAdded>, discovery: FakeDiscovery) -> Self {
        Self {
            events,
            discovery,
            keep_open: false,
        }
    }

    /// Keep the event stream open after the last event, like a real scan.
    pub fn keep_open(mut self) -> Self {
        self.keep_open = true;
        self
    }
}

impl Scanner for FakeScanner {
    fn start_scan(&self) -> BoxFuture<'_, Result<Scan, ScanError>> {
        let events = self.events.clone();
        let keep_open = self.keep_open;
        let discovery = self.discovery.clone();
        Box::pin(async move {
            let (tx, rx) = mpsc::channel::<InterfacesAdded>(events.len().max(1));
            tokio::spawn(async move {
                for event in events {
                    let _ = tx.send(event).await;
                }
                if keep_open {
                    tx.closed().await;
                }
            });
            Ok(Scan {
                events: rx,
                discovery: Box::new(discovery),
            })
        })
    }
}

/// Sink that records every reading it is given.
#[derive(Debug, Default)]
pub struct RecordingSink {
    readings: Mutex<Vec<DecodedReading>>,
    failing: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records readings but reports a publish failure for each.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn readings(&self) -> Vec<DecodedReading> {
        self.readings.lock().unwrap().clone()
    }
}

impl ReadingSink for RecordingSink {
    fn emit<'a>(&'a self, reading: &'a DecodedReading) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            self.readings.lock().unwrap().push(reading.clone());
            if self.failing {
                return Err(SinkError {
                    failures: vec![SinkFailure::Publish(PublishError::Client {
                        topic: reading.device_id.clone(),
                        reason: "broker down".to_string(),
                    })],
                });
            }
            Ok(())
        })
    }
}

/// Publisher that records `(topic, payload)` pairs.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, String)>>,
    failing: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, topic: String, payload: String) -> BoxFuture<'_, Result<(), PublishError>> {
        Box::pin(async move {
            if self.failing {
                return Err(PublishError::Client {
                    topic,
                    reason: "not connected".to_string(),
                });
            }
            self.published.lock().unwrap().push((topic, payload));
            Ok(())
        })
    }
}

/// Collects formatted log lines emitted on the current thread.
#[derive(Debug, Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Install a TRACE-level subscriber writing into this capture until the
    /// guard is dropped.
    pub fn install(&self) -> DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(self.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock().unwrap()).into_owned()
    }
}

pub struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter {
            buffer: Arc::clone(&self.buffer),
        }
    }
}
