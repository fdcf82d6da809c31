//! ==============================================================================
//! cloud.rs - client side of the cloud service
//! ==============================================================================
//!
//! purpose:
//!     the three calls the edge makes to the cloud:
//!     - push_snapshot: durable record with activation counts (every 5 min)
//!     - push_live: ephemeral reading + actuator map, fanned out to viewers
//!     - fetch_commands: up to 5 oldest pending commands for this device,
//!       returned raw so one bad entry cannot sink the whole batch
//!
//! ```text
//!     payload field names are the ones the cloud service already stores,
//!     so they stay in portuguese on the wire.
//! ```
//!
//! relationships:
//!     - used by: publisher.rs, poller.rs
//!     - trait seam so tests can swap in a recording fake
//!
//! ==============================================================================

use crate::actuators::ActivationCounts;
use crate::config::CloudConfig;
use crate::domain::{ActuatorSnapshot, Reading};
use crate::error::CloudError;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotPayload {
    pub device_id: String,
    pub timestamp: String,
    #[serde(rename = "luminosidade")]
    pub luminosity: f32,
    #[serde(rename = "umidade")]
    pub humidity: u8,
    #[serde(rename = "temperatura")]
    pub temperature: f32,
    #[serde(rename = "irrigador_times_on")]
    pub irrigator_times_on: u32,
    #[serde(rename = "lampada_times_on")]
    pub lamp_times_on: u32,
    #[serde(rename = "aquecedor_times_on")]
    pub heater_times_on: u32,
    #[serde(rename = "refrigerador_times_on")]
    pub cooler_times_on: u32,
}

impl SnapshotPayload {
    pub fn new(device_id: &str, reading: &Reading, counts: ActivationCounts) -> Self {
        Self {
            device_id: device_id.to_string(),
            timestamp: chrono::Local::now().to_rfc3339(),
            luminosity: reading.luminosity,
            humidity: reading.humidity.code(),
            temperature: reading.temperature,
            irrigator_times_on: counts.irrigator,
            lamp_times_on: counts.lamp,
            heater_times_on: counts.heater,
            cooler_times_on: counts.cooler,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LivePayload {
    pub device_id: String,
    pub timestamp: String,
    #[serde(rename = "luminosidade")]
    pub luminosity: f32,
    #[serde(rename = "umidade")]
    pub humidity: u8,
    #[serde(rename = "temperatura")]
    pub temperature: f32,
    #[serde(rename = "estado_atuadores")]
    pub actuators: ActuatorSnapshot,
}

impl LivePayload {
    pub fn new(device_id: &str, reading: &Reading, actuators: ActuatorSnapshot) -> Self {
        Self {
            device_id: device_id.to_string(),
            timestamp: chrono::Local::now().to_rfc3339(),
            luminosity: reading.luminosity,
            humidity: reading.humidity.code(),
            temperature: reading.temperature,
            actuators,
        }
    }
}

#[async_trait]
pub trait CloudApi: Send + Sync {
    async fn push_snapshot(&self, payload: &SnapshotPayload) -> Result<(), CloudError>;
    async fn push_live(&self, payload: &LivePayload) -> Result<(), CloudError>;
    async fn fetch_commands(&self, device_id: &str) -> Result<Vec<serde_json::Value>, CloudError>;
}

// ==============================================================================
// http implementation
// ==============================================================================

pub struct HttpCloud {
    client: reqwest::Client,
    snapshot_url: Option<String>,
    live_url: Option<String>,
    commands_url: Option<String>,
    snapshot_timeout: Duration,
    live_timeout: Duration,
    commands_timeout: Duration,
}

impl HttpCloud {
    pub fn new(config: &CloudConfig) -> Result<Self, CloudError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("greenhouse-edge/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            snapshot_url: config.snapshot_url.clone(),
            live_url: config.live_url.clone(),
            commands_url: config.commands_url.clone(),
            snapshot_timeout: Duration::from_secs(config.snapshot_timeout_secs),
            live_timeout: Duration::from_secs(config.live_timeout_secs),
            commands_timeout: Duration::from_secs(config.commands_timeout_secs),
        })
    }

    async fn post<T: Serialize + Sync>(
        &self,
        url: Option<&str>,
        name: &'static str,
        timeout: Duration,
        body: &T,
    ) -> Result<(), CloudError> {
        let url = url.ok_or(CloudError::NotConfigured(name))?;
        let resp = self.client.post(url).timeout(timeout).json(body).send().await?;
        check_status(resp.status())
    }
}

fn check_status(status: reqwest::StatusCode) -> Result<(), CloudError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(CloudError::Status(status))
    }
}

#[async_trait]
impl CloudApi for HttpCloud {
    async fn push_snapshot(&self, payload: &SnapshotPayload) -> Result<(), CloudError> {
        self.post(self.snapshot_url.as_deref(), "snapshot", self.snapshot_timeout, payload).await
    }

    async fn push_live(&self, payload: &LivePayload) -> Result<(), CloudError> {
        self.post(self.live_url.as_deref(), "live", self.live_timeout, payload).await
    }

    async fn fetch_commands(&self, device_id: &str) -> Result<Vec<serde_json::Value>, CloudError> {
        let url = self.commands_url.as_deref().ok_or(CloudError::NotConfigured("commands"))?;
        let resp = self
            .client
            .get(url)
            .query(&[("device_id", device_id)])
            .timeout(self.commands_timeout)
            .send()
            .await?;
        check_status(resp.status())?;
        Ok(resp.json().await?)
    }
}
