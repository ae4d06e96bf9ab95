//! TOML configuration.
//!
//! ```toml
//! [mqtt]
//! host = "10.2.1.30"
//! queue = "home/"
//!
//! [log]
//! directory = "/home/pi"
//!
//! [devices."a4:c1:38:e5:2f:38"]
//! device_type = "H5075"
//! device_id = "inside"
//! ```

use crate::registry::{DeviceRecord, DeviceRegistry, DeviceType, RegistryError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// rumqttc rejects keep-alive intervals below this.
const MIN_KEEP_ALIVE_SECS: u64 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration document.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mqtt: MqttConfig,

    #[serde(default)]
    pub log: LogConfig,

    /// Address -> device entry.
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Topic prefix, used verbatim in front of `<device_id>/temperature`.
    pub queue: String,

    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Directory for `temperatures-<date>.csv` files.
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    pub device_type: DeviceType,
    pub device_id: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "govee-listener".to_string()
}

fn default_keep_alive() -> u64 {
    30
}

fn default_log_directory() -> PathBuf {
    PathBuf::from(".")
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        content.parse()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.mqtt.keep_alive_secs < MIN_KEEP_ALIVE_SECS {
            return Err(ConfigError::Invalid(format!(
                "mqtt.keep_alive_secs must be at least {MIN_KEEP_ALIVE_SECS}"
            )));
        }
        if let Some((address, _)) = self.devices.iter().find(|(_, d)| d.device_id.contains(',')) {
            return Err(ConfigError::Invalid(format!(
                "device_id for {address} must not contain ','"
            )));
        }
        Ok(())
    }

    /// Build the device registry, normalizing every address to lowercase.
    pub fn registry(&self) -> Result<DeviceRegistry, ConfigError> {
        let records = self
            .devices
            .iter()
            .map(|(address, device)| {
                if let DeviceType::Unsupported(name) = &device.device_type {
                    warn!(
                        %address,
                        device_type = %name,
                        "unsupported device type, readings will be rejected"
                    );
                }
                DeviceRecord::new(address, device.device_type.clone(), &device.device_id)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(DeviceRegistry::from_records(records)?)
    }
}

impl std::str::FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Config = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}
