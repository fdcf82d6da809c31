//! ==============================================================================
//! publisher.rs - telemetry publisher (live + snapshot cadences)
//! ==============================================================================
//!
//! live:
//!     consumes significant readings from the ingestor and pushes each one,
//!     with the actuator map captured at the time, to the live sink.
//!     fire-and-forget: a failed push is logged and the update is gone.
//!
//! snapshot:
//!     every `period` reads the latest raw reading and pushes it together with
//!     the activation counters, which are zeroed whether or not the push
//!     worked. without a complete reading the cycle is skipped and the
//!     counters keep accumulating.
//!
//! ==============================================================================

use crate::actuators::ActivationCounters;
use crate::cloud::{CloudApi, LivePayload, SnapshotPayload};
use crate::domain::Reading;
use crate::ingest::LiveUpdate;
use crate::state::EdgeState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

pub struct LivePublisher {
    cloud: Arc<dyn CloudApi>,
    device_id: String,
    updates: mpsc::Receiver<LiveUpdate>,
}

impl LivePublisher {
    pub fn new(cloud: Arc<dyn CloudApi>, device_id: String, updates: mpsc::Receiver<LiveUpdate>) -> Self {
        Self { cloud, device_id, updates }
    }

    /// runs until every sender is gone
    pub async fn run(mut self) {
        while let Some(update) = self.updates.recv().await {
            let payload = LivePayload::new(&self.device_id, &update.reading, update.actuators);
            if let Err(e) = self.cloud.push_live(&payload).await {
                tracing::warn!("live push failed: {}", e);
            }
        }
        tracing::debug!("live channel closed, publisher stopping");
    }
}

pub struct SnapshotPublisher {
    cloud: Arc<dyn CloudApi>,
    device_id: String,
    latest: watch::Receiver<Option<Reading>>,
    counters: Arc<ActivationCounters>,
    period: Duration,
}

impl SnapshotPublisher {
    pub fn new(cloud: Arc<dyn CloudApi>, device_id: String, state: &EdgeState, period: Duration) -> Self {
        Self {
            cloud,
            device_id,
            latest: state.latest.clone(),
            counters: state.counters.clone(),
            period,
        }
    }

    pub async fn run(self) {
        // first snapshot goes out one full period after startup
        let start = tokio::time::Instant::now() + self.period;
        let mut ticker = tokio::time::interval_at(start, self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.publish_once().await;
        }
    }

    /// returns the payload that was pushed (or attempted), if any
    pub async fn publish_once(&self) -> Option<SnapshotPayload> {
        let latest = self.latest.borrow().clone();
        let Some(reading) = latest else {
            tracing::warn!("sensor data incomplete, snapshot skipped");
            return None;
        };
        let counts = self.counters.take();
        let payload = SnapshotPayload::new(&self.device_id, &reading, counts);
        match self.cloud.push_snapshot(&payload).await {
            Ok(()) => tracing::info!(?counts, "snapshot sent"),
            Err(e) => tracing::warn!("snapshot push failed, counters lost: {}", e),
        }
        Some(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlConfig;
    use crate::domain::{ActuatorId, ActuatorSnapshot, Humidity, Switch};
    use crate::error::CloudError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCloud {
        snapshots: Mutex<Vec<SnapshotPayload>>,
        live: Mutex<Vec<LivePayload>>,
        fail: bool,
    }

    #[async_trait]
    impl CloudApi for RecordingCloud {
        async fn push_snapshot(&self, p: &SnapshotPayload) -> Result<(), CloudError> {
            self.snapshots.lock().unwrap().push(p.clone());
            if self.fail { Err(CloudError::NotConfigured("snapshot")) } else { Ok(()) }
        }
        async fn push_live(&self, p: &LivePayload) -> Result<(), CloudError> {
            self.live.lock().unwrap().push(p.clone());
            if self.fail { Err(CloudError::NotConfigured("live")) } else { Ok(()) }
        }
        async fn fetch_commands(&self, _: &str) -> Result<Vec<serde_json::Value>, CloudError> {
            Ok(Vec::new())
        }
    }

    fn reading() -> Reading {
        Reading {
            luminosity: 321.0,
            humidity: Humidity::Wet,
            temperature: 24.5,
            observed_at: chrono::Local::now(),
        }
    }

    #[tokio::test]
    async fn test_snapshot_skipped_without_reading() {
        let cloud = Arc::new(RecordingCloud::default());
        let (state, _tx) = EdgeState::new(&ControlConfig::default());
        state.counters.record(ActuatorId::Lamp);

        let publisher = SnapshotPublisher::new(cloud.clone(), "e".into(), &state, Duration::from_secs(300));
        assert!(publisher.publish_once().await.is_none());
        assert!(cloud.snapshots.lock().unwrap().is_empty());
        // counters are kept for the next cycle
        assert_eq!(state.counters.peek().lamp, 1);
    }

    #[tokio::test]
    async fn test_snapshot_resets_counters_even_on_failure() {
        let cloud = Arc::new(RecordingCloud { fail: true, ..Default::default() });
        let (state, tx) = EdgeState::new(&ControlConfig::default());
        tx.send_replace(Some(reading()));
        state.counters.record(ActuatorId::Heater);
        state.counters.record(ActuatorId::Heater);

        let publisher = SnapshotPublisher::new(cloud.clone(), "e".into(), &state, Duration::from_secs(300));
        let payload = publisher.publish_once().await.unwrap();
        assert_eq!(payload.heater_times_on, 2);
        assert_eq!(payload.temperature, 24.5);
        assert_eq!(payload.humidity, 0);
        assert_eq!(state.counters.peek().heater, 0);

        let again = publisher.publish_once().await.unwrap();
        assert_eq!(again.heater_times_on, 0);
    }

    #[tokio::test]
    async fn test_live_publisher_drains_channel() {
        let cloud = Arc::new(RecordingCloud { fail: true, ..Default::default() });
        let (tx, rx) = mpsc::channel(4);
        let actuators = ActuatorSnapshot { lamp: Switch::On, ..Default::default() };
        tx.send(LiveUpdate { reading: reading(), actuators }).await.unwrap();
        tx.send(LiveUpdate { reading: reading(), actuators }).await.unwrap();
        drop(tx);

        LivePublisher::new(cloud.clone(), "e".into(), rx).run().await;

        let live = cloud.live.lock().unwrap();
        assert_eq!(live.len(), 2);
        assert_eq!(live[0].actuators.lamp, Switch::On);
        assert_eq!(live[0].device_id, "e");
    }
}
