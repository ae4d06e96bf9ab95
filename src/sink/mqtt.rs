//! Broker publishing.
//!
//! Topics are `<prefix><device_id>/temperature` and `<prefix><device_id>/humidity`;
//! the prefix is used verbatim, so it normally ends with `/`.

use crate::config::MqttConfig;
use futures::future::BoxFuture;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Capacity of the request channel between client and event loop.
const REQUEST_CHANNEL_CAPACITY: usize = 16;

/// Delay before polling again after a connection error.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PublishError {
    #[error("publish to {topic} failed: {reason}")]
    Client { topic: String, reason: String },
}

/// Publish side of a broker client.
pub trait Publisher: Send + Sync {
    fn publish(&self, topic: String, payload: String) -> BoxFuture<'_, Result<(), PublishError>>;
}

pub fn temperature_topic(prefix: &str, device_id: &str) -> String {
    format!("{prefix}{device_id}/temperature")
}

pub fn humidity_topic(prefix: &str, device_id: &str) -> String {
    format!("{prefix}{device_id}/humidity")
}

/// `rumqttc` backed publisher.
#[derive(Debug, Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    /// Create the client and spawn the task driving its event loop.
    ///
    /// The connection is established lazily by the event loop. Publishes made
    /// while it is down are queued in the request channel until it is full;
    /// after that they fail instead of waiting for the broker.
    pub fn connect(config: &MqttConfig) -> (Self, JoinHandle<()>) {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        let handle = tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(event) => debug!(?event, "mqtt event"),
                    Err(e) => {
                        warn!(error = %e, "mqtt connection error");
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        });

        (Self { client }, handle)
    }

    /// Queue a disconnect request without waiting for the event loop.
    pub fn disconnect(&self) {
        if let Err(e) = self.client.try_disconnect() {
            debug!(error = %e, "mqtt disconnect failed");
        }
    }
}

impl Publisher for MqttPublisher {
    fn publish(&self, topic: String, payload: String) -> BoxFuture<'_, Result<(), PublishError>> {
        let result = self
            .client
            .try_publish(topic.as_str(), QoS::AtMostOnce, false, payload)
            .map_err(|e| PublishError::Client {
                topic,
                reason: e.to_string(),
            });
        Box::pin(async move { result })
    }
}
