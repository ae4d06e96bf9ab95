//! Decoded sensor reading.

use chrono::{DateTime, SecondsFormat, Utc};

/// One calibrated reading from a registered sensor.
///
/// - Temperature in Celsius
/// - Relative humidity in percent (0-100)
/// - Battery level in percent (0-100)
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedReading {
    /// Label from the device registry
    pub device_id: String,
    /// Time the advertisement was handled
    pub timestamp: DateTime<Utc>,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub battery_pct: u8,
}

/// Render a measurement the way the log and broker consumers expect it: shortest
/// round-trip form, with `.0` kept on whole values (`20.0`, not `20`).
pub fn format_measurement(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

impl DecodedReading {
    /// Render as an append-log row: `device_id,timestamp,temperature,humidity,battery`.
    ///
    /// No quoting is applied; device ids never contain commas.
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{},{},{}",
            self.device_id,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            format_measurement(self.temperature_c),
            format_measurement(self.humidity_pct),
            self.battery_pct
        )
    }
}
