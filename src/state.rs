//! shared state handed to every worker.
//!
//! there are no globals: main builds one `EdgeState` and each worker clones
//! the handles it needs.
//!
//! - latest reading: watch channel, the ingestor is the only sender
//! - actuators: see actuators.rs for the single-writer rules
//! - thresholds: written only by the dispatcher (local-config commands)
//! - queue: many producers, the dispatcher is the only consumer

use crate::actuators::{ActivationCounters, ActuatorState};
use crate::commands::CommandQueue;
use crate::config::ControlConfig;
use crate::domain::{Reading, Thresholds};
use std::sync::Arc;
use tokio::sync::{watch, RwLock};

#[derive(Clone)]
pub struct EdgeState {
    pub latest: watch::Receiver<Option<Reading>>,
    pub actuators: Arc<ActuatorState>,
    pub counters: Arc<ActivationCounters>,
    pub thresholds: Arc<RwLock<Thresholds>>,
    pub queue: Arc<CommandQueue>,
}

impl EdgeState {
    /// returns the state plus the sender side of the latest-reading slot,
    /// which belongs to the ingestor alone
    pub fn new(control: &ControlConfig) -> (Self, watch::Sender<Option<Reading>>) {
        let (tx, rx) = watch::channel(None);
        let state = Self {
            latest: rx,
            actuators: Arc::new(ActuatorState::new(control.auto_mode)),
            counters: Arc::new(ActivationCounters::default()),
            thresholds: Arc::new(RwLock::new(control.thresholds())),
            queue: Arc::new(CommandQueue::new()),
        };
        (state, tx)
    }

    pub fn latest_reading(&self) -> Option<Reading> {
        self.latest.borrow().clone()
    }
}
