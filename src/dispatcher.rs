//! ==============================================================================
//! dispatcher.rs - drains the command queue towards the device
//! ==============================================================================
//!
//! purpose:
//!     sole consumer of the command queue. for each token:
//!     1. local config (set_limiteTemp_/set_limiteLuz_): validate and update
//!        the thresholds. never forwarded.
//!     2. anything else: forwarded verbatim to the device. if it names an
//!        actuator, the record is updated after the write succeeds.
//!
//! pacing:
//!     after each device command the dispatcher waits `interval` so the board
//!     is not flooded. local config commands are not paced.
//!
//! delivery:
//!     at-most-once. a token is consumed whether or not the write worked.
//!
//! ==============================================================================

use crate::actuators::ActuatorState;
use crate::commands::{Command, CommandQueue};
use crate::device::DeviceSink;
use crate::domain::{ActuatorId, Switch, Thresholds};
use crate::error::CommandError;
use crate::state::EdgeState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// what happened to one token
#[derive(Debug, PartialEq)]
pub enum Outcome {
    /// thresholds updated
    Configured(Thresholds),
    /// written to the device; `changed` is set when the actuator record moved
    Forwarded { changed: Option<(ActuatorId, Switch)> },
    /// dropped before reaching the device
    Rejected(CommandError),
    /// the write to the device failed
    Failed,
}

impl Outcome {
    fn reached_device(&self) -> bool {
        matches!(self, Self::Forwarded { .. } | Self::Failed)
    }
}

pub struct CommandDispatcher<S> {
    sink: S,
    queue: Arc<CommandQueue>,
    actuators: Arc<ActuatorState>,
    thresholds: Arc<RwLock<Thresholds>>,
    interval: Duration,
    idle: Duration,
}

impl<S: DeviceSink> CommandDispatcher<S> {
    pub fn new(sink: S, state: &EdgeState, interval: Duration, idle: Duration) -> Self {
        Self {
            sink,
            queue: state.queue.clone(),
            actuators: state.actuators.clone(),
            thresholds: state.thresholds.clone(),
            interval,
            idle,
        }
    }

    pub async fn run(mut self) {
        loop {
            let Some(token) = self.queue.pop_or_wait(self.idle).await else {
                continue;
            };
            let outcome = self.apply(&token).await;
            if outcome.reached_device() {
                tokio::time::sleep(self.interval).await;
            }
        }
    }

    /// processes a single token
    pub async fn apply(&mut self, token: &str) -> Outcome {
        tracing::info!(%token, "processing command");
        let command = match Command::parse(token) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("discarding command: {}", e);
                return Outcome::Rejected(e);
            }
        };

        match command {
            Command::SetTempLimit(v) => self.configure(|t| t.set_temp_limit(v)).await,
            Command::SetLuxLimit(v) => self.configure(|t| t.set_lux_limit(v)).await,
            Command::Device { raw, target } => self.forward(&raw, target).await,
        }
    }

    async fn configure(&mut self, update: impl FnOnce(&mut Thresholds) -> Result<(), CommandError>) -> Outcome {
        let mut limits = self.thresholds.write().await;
        match update(&mut limits) {
            Ok(()) => {
                tracing::info!(
                    temp_limit = limits.temp_limit,
                    lux_limit = limits.lux_limit,
                    "thresholds updated"
                );
                Outcome::Configured(*limits)
            }
            Err(e) => {
                tracing::warn!("threshold rejected: {}", e);
                Outcome::Rejected(e)
            }
        }
    }

    async fn forward(&mut self, raw: &str, target: Option<(ActuatorId, Switch)>) -> Outcome {
        if let Some((id, switch)) = target {
            if let Err(e) = self.actuators.check(id, switch).await {
                tracing::warn!(token = %raw, "not forwarding: {}", e);
                return Outcome::Rejected(e.into());
            }
        }

        if let Err(e) = self.sink.send_line(raw).await {
            tracing::warn!(token = %raw, "device write failed: {}", e);
            return Outcome::Failed;
        }
        tracing::debug!(token = %raw, "forwarded to device");

        let Some((id, switch)) = target else {
            return Outcome::Forwarded { changed: None };
        };
        match self.actuators.apply(id, switch).await {
            Ok(true) => {
                tracing::info!(actuator = ?id, state = %switch, "actuator state updated");
                Outcome::Forwarded { changed: Some((id, switch)) }
            }
            Ok(false) => Outcome::Forwarded { changed: None },
            // only reachable if something else switched the partner in between
            Err(e) => {
                tracing::warn!("actuator record not updated: {}", e);
                Outcome::Forwarded { changed: None }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlConfig;
    use crate::domain::ActuatorSnapshot;
    use crate::error::DeviceError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct RecordingSink {
        lines: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl DeviceSink for RecordingSink {
        async fn send_line(&mut self, line: &str) -> Result<(), DeviceError> {
            if self.fail {
                return Err(DeviceError::Write(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged")));
            }
            self.lines.lock().unwrap().push(line.to_string());
            Ok(())
        }
    }

    fn setup(sink: RecordingSink) -> (EdgeState, CommandDispatcher<RecordingSink>) {
        let (state, _tx) = EdgeState::new(&ControlConfig::default());
        let d = CommandDispatcher::new(sink, &state, Duration::ZERO, Duration::from_millis(1));
        (state, d)
    }

    #[tokio::test]
    async fn test_threshold_commands_stay_local() {
        let sink = RecordingSink::default();
        let (state, mut d) = setup(sink.clone());

        assert!(matches!(d.apply("set_limiteTemp_25").await, Outcome::Configured(_)));
        assert_eq!(state.thresholds.read().await.temp_limit, 25.0);

        assert!(matches!(d.apply("set_limiteTemp_5").await, Outcome::Rejected(CommandError::OutOfRange { .. })));
        assert_eq!(state.thresholds.read().await.temp_limit, 25.0);

        assert!(matches!(d.apply("set_limiteLuz_1500").await, Outcome::Rejected(_)));
        assert_eq!(state.thresholds.read().await.lux_limit, 700.0);

        assert!(matches!(d.apply("set_limiteLuz_abc").await, Outcome::Rejected(CommandError::Malformed(_))));
        assert!(sink.lines.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_toggle_updates_state_once() {
        let sink = RecordingSink::default();
        let (state, mut d) = setup(sink.clone());

        assert_eq!(
            d.apply("toggleLampada_ON").await,
            Outcome::Forwarded { changed: Some((ActuatorId::Lamp, Switch::On)) }
        );
        assert_eq!(d.apply("toggleLampada_ON").await, Outcome::Forwarded { changed: None });
        assert_eq!(state.actuators.get(ActuatorId::Lamp).await, Switch::On);
        assert_eq!(*sink.lines.lock().unwrap(), vec!["toggleLampada_ON", "toggleLampada_ON"]);
    }

    #[tokio::test]
    async fn test_unknown_tokens_are_forwarded_verbatim() {
        let sink = RecordingSink::default();
        let (state, mut d) = setup(sink.clone());
        assert_eq!(d.apply("beep").await, Outcome::Forwarded { changed: None });
        assert_eq!(*sink.lines.lock().unwrap(), vec!["beep"]);
        assert_eq!(state.actuators.snapshot().await, ActuatorSnapshot::default());
    }

    #[tokio::test]
    async fn test_interlock_blocks_forwarding() {
        let sink = RecordingSink::default();
        let (state, mut d) = setup(sink.clone());
        d.apply("toggleRefrigerador_ON").await;

        let outcome = d.apply("toggleAquecedor_ON").await;
        assert!(matches!(outcome, Outcome::Rejected(CommandError::Interlock(_))));
        assert_eq!(*sink.lines.lock().unwrap(), vec!["toggleRefrigerador_ON"]);
        assert_eq!(state.actuators.get(ActuatorId::Heater).await, Switch::Off);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_state_alone() {
        let sink = RecordingSink { fail: true, ..Default::default() };
        let (state, mut d) = setup(sink);
        assert_eq!(d.apply("toggleIrrigador_ON").await, Outcome::Failed);
        assert_eq!(state.actuators.get(ActuatorId::Irrigator).await, Switch::Off);
    }

    #[tokio::test]
    async fn test_run_drains_in_order() {
        let sink = RecordingSink::default();
        let (state, d) = setup(sink.clone());
        state.queue.push("toggleLampada_ON".into());
        state.queue.push("set_limiteLuz_300".into());
        state.queue.push("toggleLampada_OFF".into());

        let worker = tokio::spawn(d.run());
        for _ in 0..100 {
            if sink.lines.lock().unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        worker.abort();

        assert_eq!(*sink.lines.lock().unwrap(), vec!["toggleLampada_ON", "toggleLampada_OFF"]);
        assert_eq!(state.thresholds.read().await.lux_limit, 300.0);
        assert_eq!(state.actuators.get(ActuatorId::Lamp).await, Switch::Off);
        assert!(state.queue.is_empty());
    }
}
