//! ==============================================================================
//! ingest.rs - serial telemetry ingestor
//! ==============================================================================
//!
//! purpose:
//!     turns `KEY:VALUE;KEY:VALUE` lines from the device into readings.
//!     - every complete reading overwrites the latest-reading slot
//!       (the auto-pilot and snapshot publisher read it from there)
//!     - readings the change filter lets through become live updates
//!
//! failure model:
//!     nothing here is fatal. bad bytes, missing keys and non-numeric values
//!     are logged and the line is dropped. read errors retry after the idle
//!     interval, doubling up to READ_BACKOFF_MAX while the link stays broken.
//!
//! ==============================================================================

use crate::actuators::ActuatorState;
use crate::domain::{ActuatorSnapshot, Humidity, Reading};
use crate::error::LineError;
use crate::filter::ChangeFilter;
use chrono::Local;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, watch};

pub const KEY_LUMINOSITY: &str = "LDR";
pub const KEY_HUMIDITY: &str = "UMIDADE";
pub const KEY_TEMPERATURE: &str = "TEMPERATURA";

pub const READ_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// a significant reading paired with the actuator state at the time it was seen
#[derive(Debug, Clone)]
pub struct LiveUpdate {
    pub reading: Reading,
    pub actuators: ActuatorSnapshot,
}

/// parses one telemetry line. unknown keys and pairs without ':' are ignored.
pub fn parse_line(line: &str) -> Result<Reading, LineError> {
    let fields: HashMap<&str, &str> = line
        .split(';')
        .filter_map(|part| part.split_once(':'))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect();

    let luminosity = number(&fields, KEY_LUMINOSITY)?;
    let raw_humidity = field(&fields, KEY_HUMIDITY)?;
    let humidity_code = raw_humidity.parse::<i64>().map_err(|_| LineError::NotNumeric {
        field: KEY_HUMIDITY,
        value: raw_humidity.to_string(),
    })?;
    let humidity = Humidity::from_code(humidity_code).ok_or(LineError::BadHumidity(humidity_code))?;
    let temperature = number(&fields, KEY_TEMPERATURE)?;

    Ok(Reading { luminosity, humidity, temperature, observed_at: Local::now() })
}

fn field<'a>(fields: &HashMap<&str, &'a str>, key: &'static str) -> Result<&'a str, LineError> {
    match fields.get(key) {
        Some(v) if !v.is_empty() => Ok(*v),
        _ => Err(LineError::MissingField(key)),
    }
}

fn number(fields: &HashMap<&str, &str>, key: &'static str) -> Result<f32, LineError> {
    let raw = field(fields, key)?;
    raw.parse::<f32>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| LineError::NotNumeric { field: key, value: raw.to_string() })
}

// ==============================================================================
// worker
// ==============================================================================

pub struct Ingestor {
    latest: watch::Sender<Option<Reading>>,
    filter: ChangeFilter,
    actuators: Arc<ActuatorState>,
    live: Option<mpsc::Sender<LiveUpdate>>,
    idle: Duration,
    show_sensor_data: bool,
}

impl Ingestor {
    pub fn new(
        latest: watch::Sender<Option<Reading>>,
        actuators: Arc<ActuatorState>,
        live: Option<mpsc::Sender<LiveUpdate>>,
        idle: Duration,
    ) -> Self {
        Self {
            latest,
            filter: ChangeFilter::new(),
            actuators,
            live,
            idle,
            show_sensor_data: false,
        }
    }

    pub fn show_sensor_data(mut self, show: bool) -> Self {
        self.show_sensor_data = show;
        self
    }

    /// reads lines until the link reports end of stream
    pub async fn run<R: AsyncBufRead + Unpin>(mut self, mut reader: R) {
        let mut buf = Vec::with_capacity(128);
        let mut failures: u32 = 0;
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => {
                    tracing::warn!("device link closed, ingestor stopping");
                    return;
                }
                Ok(_) => {
                    if failures > 0 {
                        tracing::info!(failures, "serial read recovered");
                        failures = 0;
                    }
                    let line = String::from_utf8_lossy(&buf);
                    self.handle_line(&line).await;
                }
                Err(e) => {
                    failures = failures.saturating_add(1);
                    // first failure, then every power of two
                    if failures.is_power_of_two() {
                        tracing::warn!(failures, "serial read failed: {}", e);
                    }
                    tokio::time::sleep(read_backoff(self.idle, failures)).await;
                }
            }
        }
    }

    /// processes one raw line. returns the reading when it was significant.
    pub async fn handle_line(&mut self, line: &str) -> Option<Reading> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let reading = match parse_line(line) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(%line, "dropping telemetry line: {}", e);
                return None;
            }
        };

        self.latest.send_replace(Some(reading.clone()));

        if !self.filter.admit(&reading) {
            return None;
        }

        if self.show_sensor_data {
            tracing::info!(
                "significant reading: lum={:.2} hum={:?} temp={:.2}°C",
                reading.luminosity,
                reading.humidity,
                reading.temperature
            );
        }

        if let Some(live) = &self.live {
            let update = LiveUpdate { reading: reading.clone(), actuators: self.actuators.snapshot().await };
            if let Err(e) = live.try_send(update) {
                tracing::warn!("live update dropped: {}", e);
            }
        }
        Some(reading)
    }
}

/// idle, 2x idle, 4x idle ... capped at READ_BACKOFF_MAX
fn read_backoff(idle: Duration, failures: u32) -> Duration {
    let factor = 1u32 << failures.saturating_sub(1).min(16);
    idle.saturating_mul(factor).min(READ_BACKOFF_MAX)
}
