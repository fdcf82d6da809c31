//! remote command poller: pulls pending commands from the cloud on a fixed
//! period. a failed fetch is just "no commands this cycle".

use crate::actuators::ActuatorState;
use crate::cloud::CloudApi;
use crate::commands::{route_descriptor, CommandDescriptor, CommandQueue};
use crate::state::EdgeState;
use std::sync::Arc;
use std::time::Duration;

pub struct RemoteCommandPoller {
    cloud: Arc<dyn CloudApi>,
    device_id: String,
    queue: Arc<CommandQueue>,
    actuators: Arc<ActuatorState>,
    period: Duration,
}

impl RemoteCommandPoller {
    pub fn new(cloud: Arc<dyn CloudApi>, device_id: String, state: &EdgeState, period: Duration) -> Self {
        Self {
            cloud,
            device_id,
            queue: state.queue.clone(),
            actuators: state.actuators.clone(),
            period,
        }
    }

    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.poll_once().await;
        }
    }

    /// returns how many commands were routed
    pub async fn poll_once(&self) -> usize {
        let entries = match self.cloud.fetch_commands(&self.device_id).await {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("command fetch failed: {}", e);
                return 0;
            }
        };
        if !entries.is_empty() {
            tracing::info!(count = entries.len(), "commands received from cloud");
        }
        let mut routed = 0;
        for entry in entries {
            match serde_json::from_value::<CommandDescriptor>(entry.clone()) {
                Ok(desc) => {
                    route_descriptor(desc, &self.queue, &self.actuators).await;
                    routed += 1;
                }
                Err(_) => tracing::warn!(%entry, "skipping unrecognised command entry"),
            }
        }
        routed
    }
}
