//! ==============================================================================
//! actuators.rs - actuator record, auto-pilot flag and activation counters
//! ==============================================================================
//!
//! purpose:
//!     holds the ON/OFF state of the four actuators as last CONFIRMED by a
//!     successful device write. nothing flips a switch optimistically.
//!
//! ownership:
//!     - dispatcher.rs is the only writer of switch states
//!     - the auto-pilot flag is written by whoever routes a set_auto_mode
//!       directive (remote poller or the control api)
//!     - everybody else reads snapshots
//!
//! interlock:
//!     heater and cooler can never be ON at the same time. the record itself
//!     refuses a transition that would break this, so it holds no matter what
//!     order commands come out of the queue.
//!
//! ==============================================================================

use crate::domain::{ActuatorId, ActuatorSnapshot, Switch};
use crate::error::InterlockError;
use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Record {
    switches: [Switch; 4],
    auto_pilot: bool,
}

#[derive(Debug, Default)]
pub struct ActuatorState {
    inner: RwLock<Record>,
}

impl ActuatorState {
    pub fn new(auto_pilot: bool) -> Self {
        Self {
            inner: RwLock::new(Record { auto_pilot, ..Default::default() }),
        }
    }

    pub async fn snapshot(&self) -> ActuatorSnapshot {
        let r = self.inner.read().await;
        ActuatorSnapshot {
            irrigator: r.switches[ActuatorId::Irrigator.index()],
            lamp: r.switches[ActuatorId::Lamp.index()],
            heater: r.switches[ActuatorId::Heater.index()],
            cooler: r.switches[ActuatorId::Cooler.index()],
            auto_pilot: r.auto_pilot.into(),
        }
    }

    pub async fn get(&self, id: ActuatorId) -> Switch {
        self.inner.read().await.switches[id.index()]
    }

    pub async fn auto_pilot(&self) -> bool {
        self.inner.read().await.auto_pilot
    }

    /// returns the previous value
    pub async fn set_auto_pilot(&self, enabled: bool) -> bool {
        let mut r = self.inner.write().await;
        std::mem::replace(&mut r.auto_pilot, enabled)
    }

    /// checks whether `id -> target` would be accepted, without applying it
    pub async fn check(&self, id: ActuatorId, target: Switch) -> Result<(), InterlockError> {
        interlock(&self.inner.read().await.switches, id, target)
    }

    /// applies a confirmed transition. returns whether the state changed.
    pub async fn apply(&self, id: ActuatorId, target: Switch) -> Result<bool, InterlockError> {
        let mut r = self.inner.write().await;
        interlock(&r.switches, id, target)?;
        let slot = &mut r.switches[id.index()];
        if *slot == target {
            return Ok(false);
        }
        *slot = target;
        Ok(true)
    }
}

fn interlock(switches: &[Switch; 4], id: ActuatorId, target: Switch) -> Result<(), InterlockError> {
    let other = match id {
        ActuatorId::Heater => ActuatorId::Cooler,
        ActuatorId::Cooler => ActuatorId::Heater,
        _ => return Ok(()),
    };
    if target.is_on() && switches[other.index()].is_on() {
        return Err(InterlockError { requested: id, blocking: other });
    }
    Ok(())
}

// ==============================================================================
// activation counters
// ==============================================================================
// best-effort: counts ON intents since the last snapshot flush. a failed
// snapshot push loses them.

#[derive(Debug, Default)]
pub struct ActivationCounters {
    counts: [AtomicU32; 4],
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ActivationCounts {
    pub irrigator: u32,
    pub lamp: u32,
    pub heater: u32,
    pub cooler: u32,
}

impl ActivationCounters {
    pub fn record(&self, id: ActuatorId) {
        self.counts[id.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn peek(&self) -> ActivationCounts {
        self.collect(|c| c.load(Ordering::Relaxed))
    }

    /// reads and zeroes every counter
    pub fn take(&self) -> ActivationCounts {
        self.collect(|c| c.swap(0, Ordering::Relaxed))
    }

    fn collect(&self, f: impl Fn(&AtomicU32) -> u32) -> ActivationCounts {
        ActivationCounts {
            irrigator: f(&self.counts[ActuatorId::Irrigator.index()]),
            lamp: f(&self.counts[ActuatorId::Lamp.index()]),
            heater: f(&self.counts[ActuatorId::Heater.index()]),
            cooler: f(&self.counts[ActuatorId::Cooler.index()]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_apply_reports_change_once() {
        let state = ActuatorState::new(false);
        assert_eq!(state.apply(ActuatorId::Lamp, Switch::On).await, Ok(true));
        assert_eq!(state.apply(ActuatorId::Lamp, Switch::On).await, Ok(false));
        assert_eq!(state.get(ActuatorId::Lamp).await, Switch::On);
    }

    #[tokio::test]
    async fn test_heater_and_cooler_are_interlocked() {
        let state = ActuatorState::new(false);
        state.apply(ActuatorId::Cooler, Switch::On).await.unwrap();

        let err = state.apply(ActuatorId::Heater, Switch::On).await.unwrap_err();
        assert_eq!(err.blocking, ActuatorId::Cooler);
        assert_eq!(state.get(ActuatorId::Heater).await, Switch::Off);

        // turning the heater OFF is always fine
        assert!(state.check(ActuatorId::Heater, Switch::Off).await.is_ok());

        state.apply(ActuatorId::Cooler, Switch::Off).await.unwrap();
        assert_eq!(state.apply(ActuatorId::Heater, Switch::On).await, Ok(true));
        assert!(state.check(ActuatorId::Cooler, Switch::On).await.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_carries_auto_pilot_flag() {
        let state = ActuatorState::new(true);
        assert_eq!(state.snapshot().await.auto_pilot, Switch::On);
        assert!(state.set_auto_pilot(false).await);
        assert_eq!(state.snapshot().await.auto_pilot, Switch::Off);
    }

    #[test]
    fn test_counters_reset_on_take() {
        let c = ActivationCounters::default();
        c.record(ActuatorId::Lamp);
        c.record(ActuatorId::Lamp);
        c.record(ActuatorId::Cooler);
        assert_eq!(c.take(), ActivationCounts { lamp: 2, cooler: 1, ..Default::default() });
        assert_eq!(c.peek(), ActivationCounts::default());
    }
}
