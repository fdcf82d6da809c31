//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `edge.toml`.
//!     loads configuration from file or falls back to defaults, then applies
//!     environment overrides for the deployment-specific bits.
//!
//! structure:
//!     - DeviceConfig: serial port of the microcontroller.
//!     - CloudConfig: device identity and the three cloud endpoints.
//!     - TimingConfig: every loop period in one place.
//!     - ControlConfig: initial thresholds and auto-pilot mode.
//!     - ApiConfig: local control channel.
//!     - LoggingConfig: log level and sensor echo.
//!
//! ==============================================================================

use crate::domain::{Thresholds, LUX_LIMIT_RANGE, TEMP_LIMIT_RANGE};
use anyhow::{bail, Context};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct EdgeConfig {
    pub device: DeviceConfig,
    pub cloud: CloudConfig,
    pub timing: TimingConfig,
    pub control: ControlConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeviceConfig {
    pub port: String,
    pub baud_rate: u32,
    /// the board resets when the port opens; give it time before talking
    pub settle_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CloudConfig {
    pub device_id: String,
    pub snapshot_url: Option<String>,
    pub live_url: Option<String>,
    pub commands_url: Option<String>,
    pub snapshot_timeout_secs: u64,
    pub live_timeout_secs: u64,
    pub commands_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct TimingConfig {
    pub ingest_idle_ms: u64,
    pub autopilot_secs: u64,
    pub dispatch_interval_secs: u64,
    pub dispatch_idle_ms: u64,
    pub poll_secs: u64,
    pub snapshot_secs: u64,
    /// live updates waiting for the publisher before new ones are dropped
    pub live_queue: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ControlConfig {
    pub temp_limit: f32,
    pub lux_limit: f32,
    /// false: irrigate when dry. true: irrigate when wet.
    pub invert_humidity: bool,
    pub auto_mode: bool,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self { port: "/dev/ttyACM0".to_string(), baud_rate: 9600, settle_ms: 2000 }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            device_id: "minhaEstufa01".to_string(),
            snapshot_url: None,
            live_url: None,
            commands_url: None,
            snapshot_timeout_secs: 10,
            live_timeout_secs: 5,
            commands_timeout_secs: 5,
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            ingest_idle_ms: 5,
            autopilot_secs: 5,
            dispatch_interval_secs: 3,
            dispatch_idle_ms: 500,
            poll_secs: 10,
            snapshot_secs: 300,
            live_queue: 32,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        let t = Thresholds::default();
        Self { temp_limit: t.temp_limit, lux_limit: t.lux_limit, invert_humidity: false, auto_mode: false }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self { enabled: true, bind: "0.0.0.0:3000".to_string() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

impl TimingConfig {
    pub fn ingest_idle(&self) -> Duration {
        Duration::from_millis(self.ingest_idle_ms)
    }
    pub fn autopilot_period(&self) -> Duration {
        Duration::from_secs(self.autopilot_secs)
    }
    pub fn dispatch_interval(&self) -> Duration {
        Duration::from_secs(self.dispatch_interval_secs)
    }
    pub fn dispatch_idle(&self) -> Duration {
        Duration::from_millis(self.dispatch_idle_ms)
    }
    pub fn poll_period(&self) -> Duration {
        Duration::from_secs(self.poll_secs)
    }
    pub fn snapshot_period(&self) -> Duration {
        Duration::from_secs(self.snapshot_secs)
    }
}

impl ControlConfig {
    pub fn thresholds(&self) -> Thresholds {
        Thresholds { temp_limit: self.temp_limit, lux_limit: self.lux_limit }
    }
}

impl EdgeConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: EdgeConfig = toml::from_str(&content).context("failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        let paths = [
            std::path::PathBuf::from("config").join("edge.toml"),
            std::path::PathBuf::from("..").join("config").join("edge.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        tracing::info!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("[CONFIG] Failed to load {}: {:#}", path.display(), e);
                    }
                }
            }
        }

        tracing::warn!("[CONFIG] No usable config file found - using defaults");
        Self::default()
    }

    /// deployment values that live in the environment rather than the file
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(v) = get("ARDUINO_PORT") {
            self.device.port = v;
        }
        if let Some(v) = get("DEVICE_ID") {
            self.cloud.device_id = v;
        }
        if let Some(v) = get("CLOUD_API_ENDPOINT_LEITURAS") {
            self.cloud.snapshot_url = Some(v);
        }
        if let Some(v) = get("CLOUD_API_ENDPOINT_LIVE_UPDATE") {
            self.cloud.live_url = Some(v);
        }
        if let Some(v) = get("CLOUD_API_ENDPOINT_COMANDOS") {
            self.cloud.commands_url = Some(v);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !TEMP_LIMIT_RANGE.contains(&self.control.temp_limit) {
            bail!("control.temp_limit {} outside {:?}", self.control.temp_limit, TEMP_LIMIT_RANGE);
        }
        if !LUX_LIMIT_RANGE.contains(&self.control.lux_limit) {
            bail!("control.lux_limit {} outside {:?}", self.control.lux_limit, LUX_LIMIT_RANGE);
        }
        let t = &self.timing;
        let periods = [
            ("autopilot_secs", t.autopilot_secs),
            ("dispatch_idle_ms", t.dispatch_idle_ms),
            ("poll_secs", t.poll_secs),
            ("snapshot_secs", t.snapshot_secs),
        ];
        for (name, value) in periods {
            if value == 0 {
                bail!("timing.{} must be non-zero", name);
            }
        }
        if t.live_queue == 0 {
            bail!("timing.live_queue must be non-zero");
        }
        if self.cloud.device_id.is_empty() {
            bail!("cloud.device_id must not be empty");
        }
        Ok(())
    }

    /// Log configuration summary
    pub fn print_summary(&self) {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "(not set)".to_string());
        tracing::info!("┌─────────────────────────────────────────┐");
        tracing::info!("│           EDGE CONFIGURATION            │");
        tracing::info!("├─────────────────────────────────────────┤");
        tracing::info!("│ Device ID: {}", self.cloud.device_id);
        tracing::info!("│ Serial: {} @ {} baud", self.device.port, self.device.baud_rate);
        tracing::info!("│ Snapshot URL: {}", show(&self.cloud.snapshot_url));
        tracing::info!("│ Live URL: {}", show(&self.cloud.live_url));
        tracing::info!("│ Commands URL: {}", show(&self.cloud.commands_url));
        tracing::info!("│ Limits: {}°C / {} lux", self.control.temp_limit, self.control.lux_limit);
        tracing::info!("│ Auto-pilot: {}", if self.control.auto_mode { "ON" } else { "OFF" });
        tracing::info!("│ Log Level: {}", self.logging.level);
        tracing::info!("└─────────────────────────────────────────┘");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[device]
port = "/dev/ttyUSB0"

[control]
temp_limit = 26.5
auto_mode = true
"#
        )
        .unwrap();

        let config = EdgeConfig::load(file.path()).unwrap();
        assert_eq!(config.device.port, "/dev/ttyUSB0");
        assert_eq!(config.device.baud_rate, 9600);
        assert_eq!(config.control.thresholds(), Thresholds { temp_limit: 26.5, lux_limit: 700.0 });
        assert!(config.control.auto_mode);
        assert_eq!(config.timing.snapshot_period(), Duration::from_secs(300));
    }

    #[test]
    fn test_out_of_range_limit_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[control]\nlux_limit = 50.0").unwrap();
        assert!(EdgeConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_zero_period_is_rejected() {
        let mut config = EdgeConfig::default();
        config.timing.poll_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = EdgeConfig::default();
        config.apply_overrides(|key| match key {
            "DEVICE_ID" => Some("estufa-02".to_string()),
            "CLOUD_API_ENDPOINT_COMANDOS" => Some("http://cloud/api/comandos".to_string()),
            _ => None,
        });
        assert_eq!(config.cloud.device_id, "estufa-02");
        assert_eq!(config.cloud.commands_url.as_deref(), Some("http://cloud/api/comandos"));
        assert_eq!(config.cloud.live_url, None);
        assert_eq!(config.device.port, "/dev/ttyACM0");
    }
}
