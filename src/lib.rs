//! `govee-listener` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging setup and
//! process exit codes. Advertisement routing lives in [`crate::router`] and the
//! event loop in [`crate::app`], where both can be tested deterministically
//! with an injected scanner and sink.

pub mod app;
pub mod config;
pub mod decoder;
pub mod dedup;
pub mod mac_address;
pub mod reading;
pub mod registry;
pub mod router;
pub mod scanner;
pub mod sink;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export commonly used types at the crate root
pub use app::{Options, RunError, RunSummary, StopReason, run, run_with};
pub use config::{Config, ConfigError};
pub use decoder::{DecodeError, GOVEE_MANUFACTURER_ID, decode_h5074, decode_h5075};
pub use dedup::DedupTracker;
pub use mac_address::MacAddress;
pub use reading::DecodedReading;
pub use registry::{DeviceRecord, DeviceRegistry, DeviceType};
pub use router::{RouteOutcome, Router};
pub use scanner::{DevicePath, Discovery, DiscoveryError, InterfacesAdded, ScanError, Scanner};
pub use sink::{ReadingSink, SinkError, TelemetrySink};
