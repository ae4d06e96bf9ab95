//! Destinations for decoded readings.
//!
//! [`TelemetrySink`] writes each reading to a daily append log and publishes it
//! to the broker. The two effects are independent: a failure in one never
//! prevents the other from being attempted.

pub mod append_log;
pub mod mqtt;

use crate::reading::{DecodedReading, format_measurement};
use append_log::AppendLog;
use futures::future::BoxFuture;
use mqtt::{PublishError, Publisher, humidity_topic, temperature_topic};
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

/// Trait for consumers of decoded readings.
///
/// The router calls [`ReadingSink::emit`] exactly once per decoded reading.
pub trait ReadingSink: Send + Sync {
    fn emit<'a>(&'a self, reading: &'a DecodedReading) -> BoxFuture<'a, Result<(), SinkError>>;
}

/// A single failed sink effect.
#[derive(Error, Debug)]
pub enum SinkFailure {
    #[error("append to {path} failed: {source}")]
    AppendLog {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Every effect that failed while emitting one reading.
#[derive(Debug)]
pub struct SinkError {
    pub failures: Vec<SinkFailure>,
}

impl fmt::Display for SinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} sink effect(s) failed", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for SinkError {}

/// Append log plus broker publisher.
#[derive(Debug)]
pub struct TelemetrySink<P> {
    log: AppendLog,
    publisher: P,
    topic_prefix: String,
}

impl<P: Publisher> TelemetrySink<P> {
    pub fn new(log: AppendLog, publisher: P, topic_prefix: impl Into<String>) -> Self {
        Self {
            log,
            publisher,
            topic_prefix: topic_prefix.into(),
        }
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    async fn publish(&self, topic: String, value: f64, failures: &mut Vec<SinkFailure>) {
        if let Err(e) = self.publisher.publish(topic, format_measurement(value)).await {
            warn!(error = %e, "publish failed");
            failures.push(e.into());
        }
    }
}

impl<P: Publisher> ReadingSink for TelemetrySink<P> {
    fn emit<'a>(&'a self, reading: &'a DecodedReading) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            let mut failures = Vec::new();

            info!(
                device_id = %reading.device_id,
                temperature = reading.temperature_c,
                humidity = reading.humidity_pct,
                battery = reading.battery_pct,
                "reading"
            );

            if let Err(source) = self.log.append(reading) {
                let path = self.log.path_for(reading.timestamp.date_naive());
                warn!(path = %path.display(), error = %source, "append log write failed");
                failures.push(SinkFailure::AppendLog { path, source });
            }

            self.publish(
                temperature_topic(&self.topic_prefix, &reading.device_id),
                reading.temperature_c,
                &mut failures,
            )
            .await;
            self.publish(
                humidity_topic(&self.topic_prefix, &reading.device_id),
                reading.humidity_pct,
                &mut failures,
            )
            .await;

            if failures.is_empty() {
                Ok(())
            } else {
                Err(SinkError { failures })
            }
        })
    }
}
