//! ==============================================================================
//! commands.rs - command tokens, descriptors and the pending queue
//! ==============================================================================
//!
//! token families:
//!     - local config:  set_limiteTemp_<v>, set_limiteLuz_<v>
//!       consumed on the edge, never sent to the device
//!     - device:        toggle<Actuator>_<ON|OFF> (or anything else)
//!       forwarded verbatim, newline terminated
//!
//! the queue is a plain FIFO: no dedup, each token is consumed exactly once.
//!
//! ==============================================================================

use crate::actuators::ActuatorState;
use crate::domain::{ActuatorId, Switch};
use crate::error::CommandError;
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

pub const AUTO_MODE_DIRECTIVE: &str = "set_auto_mode";

const TEMP_LIMIT_PREFIX: &str = "set_limiteTemp_";
const LUX_LIMIT_PREFIX: &str = "set_limiteLuz_";

/// what a token means once parsed
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SetTempLimit(f32),
    SetLuxLimit(f32),
    /// forwarded as-is; `target` is set when the token names a known actuator
    Device {
        raw: String,
        target: Option<(ActuatorId, Switch)>,
    },
}

impl Command {
    pub fn parse(token: &str) -> Result<Self, CommandError> {
        if let Some(v) = token.strip_prefix(TEMP_LIMIT_PREFIX) {
            return Ok(Self::SetTempLimit(parse_value(token, v)?));
        }
        if let Some(v) = token.strip_prefix(LUX_LIMIT_PREFIX) {
            return Ok(Self::SetLuxLimit(parse_value(token, v)?));
        }
        Ok(Self::Device {
            raw: token.to_string(),
            target: actuator_target(token),
        })
    }
}

fn parse_value(token: &str, v: &str) -> Result<f32, CommandError> {
    v.trim()
        .parse::<f32>()
        .map_err(|_| CommandError::Malformed(token.to_string()))
}

/// `toggleLampada_ON` -> (Lamp, On)
fn actuator_target(token: &str) -> Option<(ActuatorId, Switch)> {
    let (name, state) = token.split_once('_')?;
    if state.contains('_') {
        return None;
    }
    let name = name.strip_prefix("toggle").unwrap_or(name);
    Some((ActuatorId::from_device_name(name)?, Switch::parse(state)?))
}

// ==============================================================================
// descriptors - what the command source (and the control api) hand us
// ==============================================================================

/// either a bare token or a `{command, value}` directive
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum CommandDescriptor {
    Token(String),
    Directive {
        command: String,
        #[serde(default)]
        value: Option<serde_json::Value>,
    },
}

/// truthiness of a directive value; anything unrecognised counts as false
pub fn directive_flag(value: Option<&serde_json::Value>) -> bool {
    match value {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => false,
    }
}

/// applies auto-mode directives directly, queues everything else
pub async fn route_descriptor(desc: CommandDescriptor, queue: &CommandQueue, actuators: &ActuatorState) {
    match desc {
        CommandDescriptor::Token(token) => {
            tracing::info!(%token, "queueing command");
            queue.push(token);
        }
        CommandDescriptor::Directive { command, value } if command == AUTO_MODE_DIRECTIVE => {
            let enabled = directive_flag(value.as_ref());
            let was = actuators.set_auto_pilot(enabled).await;
            if was != enabled {
                tracing::info!(enabled, "auto-pilot mode changed");
            }
        }
        CommandDescriptor::Directive { command, .. } => {
            tracing::info!(token = %command, "queueing directive command");
            queue.push(command);
        }
    }
}

// ==============================================================================
// queue
// ==============================================================================

#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: Mutex<VecDeque<String>>,
    notify: Notify,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, token: String) {
        self.lock().push_back(token);
        self.notify.notify_one();
    }

    pub fn pop(&self) -> Option<String> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// pops the next token, waiting at most `idle` for one to arrive
    pub async fn pop_or_wait(&self, idle: Duration) -> Option<String> {
        if let Some(token) = self.pop() {
            return Some(token);
        }
        let _ = tokio::time::timeout(idle, self.notify.notified()).await;
        self.pop()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        // a poisoned deque is still consistent
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_local_config_tokens() {
        assert_eq!(Command::parse("set_limiteTemp_25"), Ok(Command::SetTempLimit(25.0)));
        assert_eq!(Command::parse("set_limiteLuz_1500"), Ok(Command::SetLuxLimit(1500.0)));
        assert_eq!(
            Command::parse("set_limiteTemp_abc"),
            Err(CommandError::Malformed("set_limiteTemp_abc".into()))
        );
    }

    #[test]
    fn test_parse_device_tokens() {
        assert_eq!(
            Command::parse("toggleLampada_ON"),
            Ok(Command::Device {
                raw: "toggleLampada_ON".into(),
                target: Some((ActuatorId::Lamp, Switch::On)),
            })
        );
        // unknown actuator, still forwarded
        let cmd = Command::parse("toggleBomba_ON").unwrap();
        assert_eq!(cmd, Command::Device { raw: "toggleBomba_ON".into(), target: None });
        // state must be exactly ON/OFF
        assert!(matches!(Command::parse("toggleLampada_on"), Ok(Command::Device { target: None, .. })));
    }

    #[test]
    fn test_descriptor_shapes() {
        let list: Vec<CommandDescriptor> =
            serde_json::from_str(r#"["toggleIrrigador_ON", {"command": "set_auto_mode", "value": true}, {"command": "set_limiteLuz_300"}]"#)
                .unwrap();
        assert_eq!(list[0], CommandDescriptor::Token("toggleIrrigador_ON".into()));
        assert!(matches!(&list[1], CommandDescriptor::Directive { command, value: Some(_) } if command == "set_auto_mode"));
        assert!(matches!(&list[2], CommandDescriptor::Directive { value: None, .. }));
    }

    #[test]
    fn test_directive_flag() {
        assert!(directive_flag(Some(&serde_json::json!(true))));
        assert!(directive_flag(Some(&serde_json::json!(1))));
        assert!(!directive_flag(Some(&serde_json::json!(0))));
        assert!(!directive_flag(Some(&serde_json::json!("yes"))));
        assert!(!directive_flag(None));
    }

    #[tokio::test]
    async fn test_route_descriptor() {
        let queue = CommandQueue::new();
        let actuators = ActuatorState::new(false);

        route_descriptor(CommandDescriptor::Token("toggleLampada_ON".into()), &queue, &actuators).await;
        route_descriptor(
            CommandDescriptor::Directive { command: "set_auto_mode".into(), value: Some(serde_json::json!(true)) },
            &queue,
            &actuators,
        )
        .await;
        route_descriptor(
            CommandDescriptor::Directive { command: "set_limiteTemp_20".into(), value: None },
            &queue,
            &actuators,
        )
        .await;

        assert!(actuators.auto_pilot().await);
        assert_eq!(queue.pop().as_deref(), Some("toggleLampada_ON"));
        assert_eq!(queue.pop().as_deref(), Some("set_limiteTemp_20"));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_queue_is_fifo_with_duplicates() {
        let q = CommandQueue::new();
        q.push("a".into());
        q.push("b".into());
        q.push("a".into());
        assert_eq!(q.len(), 3);
        assert_eq!(q.pop_or_wait(Duration::from_millis(1)).await.as_deref(), Some("a"));
        assert_eq!(q.pop().as_deref(), Some("b"));
        assert_eq!(q.pop().as_deref(), Some("a"));
        assert_eq!(q.pop_or_wait(Duration::from_millis(5)).await, None);
    }
}
