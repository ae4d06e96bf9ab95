//! Core application runner for `govee-listener`.
//!
//! This module is intentionally decoupled from CLI parsing and process exit codes
//! so it can be tested deterministically with an injected scanner and sink.

use crate::config::{Config, ConfigError};
use crate::registry::DeviceRegistry;
use crate::router::{RouteOutcome, Router};
use crate::scanner::{RealScanner, Scan, ScanError, Scanner};
use crate::sink::append_log::AppendLog;
use crate::sink::mqtt::MqttPublisher;
use crate::sink::{ReadingSink, TelemetrySink};
use clap::Parser;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Command-line options.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Duration of scan in seconds [0 for continuous]
    #[arg(short = 'd', long, default_value_t = 0)]
    pub duration: u64,

    /// Path to the TOML configuration file
    #[arg(short = 'c', long, default_value = "govee.toml")]
    pub config: PathBuf,

    /// Bluetooth adapter to scan with (e.g. hci0). Defaults to the system default adapter.
    #[arg(long)]
    pub adapter: Option<String>,

    /// Verbose output, log every handled advertisement
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Options {
    /// Scan duration, `None` meaning run until interrupted.
    pub fn scan_duration(&self) -> Option<Duration> {
        (self.duration > 0).then(|| Duration::from_secs(self.duration))
    }
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// Why the event loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The configured scan duration elapsed
    DurationElapsed,
    /// The shutdown signal fired
    Interrupted,
    /// The discovery subsystem closed its event stream
    StreamEnded,
}

/// Per-run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub events: usize,
    pub emitted: usize,
    pub ignored: usize,
    pub malformed: usize,
    pub sink_failures: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &RouteOutcome) {
        self.events += 1;
        match outcome {
            RouteOutcome::Emitted => self.emitted += 1,
            RouteOutcome::SinkFailed => {
                self.emitted += 1;
                self.sink_failures += 1;
            }
            RouteOutcome::Malformed(_) => self.malformed += 1,
            RouteOutcome::NotADevice
            | RouteOutcome::UnknownDevice
            | RouteOutcome::UnsupportedVendorKey => self.ignored += 1,
        }
    }
}

/// Run the event loop until the scan duration elapses, `shutdown` resolves, or
/// the event stream ends.
///
/// Events are routed one at a time. Stop conditions are only checked between
/// events, so a reading being delivered is never cut off. Discovery is stopped
/// before returning in every case.
pub async fn run_with(
    registry: DeviceRegistry,
    scanner: &dyn Scanner,
    sink: &dyn ReadingSink,
    duration: Option<Duration>,
    shutdown: impl Future<Output = ()>,
) -> Result<(StopReason, RunSummary), RunError> {
    let Scan {
        mut events,
        discovery,
    } = scanner.start_scan().await?;
    let mut router = Router::new(registry, discovery.as_ref(), sink);
    let mut summary = RunSummary::default();

    let deadline = async {
        match duration {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    tokio::pin!(shutdown);

    let reason = loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => break StopReason::Interrupted,
            _ = &mut deadline => break StopReason::DurationElapsed,
            event = events.recv() => match event {
                Some(event) => {
                    let outcome = router.route(event).await;
                    summary.record(&outcome);
                }
                None => break StopReason::StreamEnded,
            },
        }
    };

    if let Err(e) = discovery.stop_discovery().await {
        warn!(error = %e, "failed to stop discovery");
    }
    info!(?reason, ?summary, "scan finished");

    Ok((reason, summary))
}

/// Load configuration, connect the sinks and scan with the BlueZ backend until
/// `shutdown` resolves or the configured duration elapses.
pub async fn run(
    options: Options,
    shutdown: impl Future<Output = ()>,
) -> Result<RunSummary, RunError> {
    let config = Config::from_file(&options.config)?;
    let registry = config.registry()?;
    info!(
        config = %options.config.display(),
        devices = registry.len(),
        "configuration loaded"
    );

    let (publisher, mqtt_task) = MqttPublisher::connect(&config.mqtt);
    let sink = TelemetrySink::new(
        AppendLog::new(&config.log.directory),
        publisher,
        config.mqtt.queue.clone(),
    );
    let scanner = RealScanner {
        adapter: options.adapter.clone(),
    };

    let result = run_with(
        registry,
        &scanner,
        &sink,
        options.scan_duration(),
        shutdown,
    )
    .await;

    sink.publisher().disconnect();
    mqtt_task.abort();

    result.map(|(_, summary)| summary)
}
