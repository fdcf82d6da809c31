//! ==============================================================================
//! autopilot.rs - automatic actuator policy
//! ==============================================================================
//!
//! purpose:
//!     every few seconds, while auto mode is on, compares the latest raw
//!     reading against the thresholds and queues the toggles needed to bring
//!     the actuators in line:
//!
//! ```text
//!         cooler     ON  when temp >= limit          OFF when temp <  limit
//!         heater     ON  when temp <  limit - 5      OFF when temp >= limit - 5
//!                    (and only while the cooler is OFF)
//!         irrigator  ON  when "should irrigate"      OFF otherwise
//!                    should irrigate = invert XOR (humidity == DRY)
//!         lamp       ON  when lux  <  lux limit      OFF when lux  >= lux limit
//! ```
//!
//! the policy never touches the actuator record. it only queues intent; the
//! dispatcher updates the record once the device has the command. an intent
//! to switch ON bumps that actuator's activation counter.
//!
//! ==============================================================================

use crate::actuators::{ActivationCounters, ActuatorState};
use crate::commands::CommandQueue;
use crate::domain::{ActuatorId, ActuatorSnapshot, Humidity, Reading, Switch, Thresholds};
use crate::state::EdgeState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};

/// how far below the cooling limit the heater kicks in
pub const HEATER_BAND: f32 = 5.0;

/// one toggle the policy wants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intent {
    pub actuator: ActuatorId,
    pub target: Switch,
}

impl Intent {
    pub fn token(&self) -> String {
        self.actuator.command(self.target)
    }
}

/// pure policy: what should change given this reading and current state
pub fn evaluate(
    reading: &Reading,
    current: &ActuatorSnapshot,
    limits: &Thresholds,
    invert_humidity: bool,
) -> Vec<Intent> {
    let mut intents = Vec::new();
    let mut push = |actuator, target| intents.push(Intent { actuator, target });
    let temp = reading.temperature;

    if temp >= limits.temp_limit && !current.cooler.is_on() {
        push(ActuatorId::Cooler, Switch::On);
    } else if temp < limits.temp_limit && current.cooler.is_on() {
        push(ActuatorId::Cooler, Switch::Off);
    }

    let heat_below = limits.temp_limit - HEATER_BAND;
    if temp < heat_below && !current.heater.is_on() && !current.cooler.is_on() {
        push(ActuatorId::Heater, Switch::On);
    } else if temp >= heat_below && current.heater.is_on() {
        push(ActuatorId::Heater, Switch::Off);
    }

    let irrigate = invert_humidity ^ (reading.humidity == Humidity::Dry);
    if irrigate != current.irrigator.is_on() {
        push(ActuatorId::Irrigator, irrigate.into());
    }

    if reading.luminosity < limits.lux_limit && !current.lamp.is_on() {
        push(ActuatorId::Lamp, Switch::On);
    } else if reading.luminosity >= limits.lux_limit && current.lamp.is_on() {
        push(ActuatorId::Lamp, Switch::Off);
    }

    intents
}

// ==============================================================================
// worker
// ==============================================================================

pub struct AutoPilot {
    latest: watch::Receiver<Option<Reading>>,
    actuators: Arc<ActuatorState>,
    counters: Arc<ActivationCounters>,
    thresholds: Arc<RwLock<Thresholds>>,
    queue: Arc<CommandQueue>,
    invert_humidity: bool,
    period: Duration,
    /// auto flag as of the previous tick, for logging transitions
    was_enabled: Option<bool>,
}

impl AutoPilot {
    pub fn new(state: &EdgeState, invert_humidity: bool, period: Duration) -> Self {
        Self {
            latest: state.latest.clone(),
            actuators: state.actuators.clone(),
            counters: state.counters.clone(),
            thresholds: state.thresholds.clone(),
            queue: state.queue.clone(),
            invert_humidity,
            period,
            was_enabled: None,
        }
    }

    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.tick().await;
        }
    }

    /// one evaluation cycle. returns the intents that were queued.
    pub async fn tick(&mut self) -> Vec<Intent> {
        let enabled = self.actuators.auto_pilot().await;
        if self.was_enabled != Some(enabled) {
            tracing::info!("auto-pilot {}", if enabled { "active" } else { "inactive" });
            self.was_enabled = Some(enabled);
        }
        if !enabled {
            return Vec::new();
        }

        let latest = self.latest.borrow().clone();
        let Some(reading) = latest else {
            tracing::warn!("auto-pilot: no sensor data yet, skipping cycle");
            return Vec::new();
        };
        let current = self.actuators.snapshot().await;
        let limits = *self.thresholds.read().await;

        let intents = evaluate(&reading, &current, &limits, self.invert_humidity);
        for intent in &intents {
            tracing::debug!(actuator = ?intent.actuator, target = %intent.target, "auto-pilot intent");
            if intent.target.is_on() {
                self.counters.record(intent.actuator);
            }
            self.queue.push(intent.token());
        }
        intents
    }
}
