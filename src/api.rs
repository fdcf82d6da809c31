//! ==============================================================================
//! api.rs - local control channel
//! ==============================================================================
//!
//! purpose:
//!     lets someone on the greenhouse network see what the edge thinks and
//!     push commands without going through the cloud.
//!
//! routes:
//!     GET  /api/state     latest reading, actuators, thresholds, queue depth
//!     POST /api/command   "toggleLampada_ON" or {"command": .., "value": ..}
//!                         routed exactly like a command fetched from the cloud
//!
//! ==============================================================================

use crate::actuators::ActivationCounts;
use crate::commands::{route_descriptor, CommandDescriptor};
use crate::domain::{ActuatorSnapshot, Reading, Thresholds};
use crate::state::EdgeState;
use anyhow::Result;
use axum::{
    extract::State,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;

#[derive(Debug, Serialize)]
pub struct StateView {
    pub reading: Option<Reading>,
    pub actuators: ActuatorSnapshot,
    pub thresholds: Thresholds,
    pub pending_commands: usize,
    pub activations: ActivationCounts,
}

pub fn router(state: EdgeState) -> Router {
    Router::new()
        .route("/api/state", get(state_handler))
        .route("/api/command", post(command_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(state: EdgeState, bind: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("control api listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn state_handler(State(state): State<EdgeState>) -> Json<StateView> {
    Json(StateView {
        reading: state.latest_reading(),
        actuators: state.actuators.snapshot().await,
        thresholds: *state.thresholds.read().await,
        pending_commands: state.queue.len(),
        activations: state.counters.peek(),
    })
}

async fn command_handler(
    State(state): State<EdgeState>,
    Json(desc): Json<CommandDescriptor>,
) -> Json<serde_json::Value> {
    route_descriptor(desc, &state.queue, &state.actuators).await;
    Json(serde_json::json!({
        "status": "ok",
        "pending_commands": state.queue.len(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlConfig;
    use crate::domain::{Humidity, Switch};

    #[tokio::test]
    async fn test_state_view_reflects_shared_state() {
        let (state, tx) = EdgeState::new(&ControlConfig::default());
        let Json(view) = state_handler(State(state.clone())).await;
        assert!(view.reading.is_none());
        assert_eq!(view.thresholds, Thresholds::default());

        tx.send_replace(Some(Reading {
            luminosity: 50.0,
            humidity: Humidity::Dry,
            temperature: 18.0,
            observed_at: chrono::Local::now(),
        }));
        state.queue.push("toggleLampada_ON".into());

        let Json(view) = state_handler(State(state)).await;
        assert_eq!(view.reading.map(|r| r.temperature), Some(18.0));
        assert_eq!(view.pending_commands, 1);
        let json = serde_json::to_value(&view.actuators).unwrap();
        assert_eq!(json["estadoLampada"], "OFF");
    }

    #[tokio::test]
    async fn test_command_handler_routes_descriptors() {
        let (state, _tx) = EdgeState::new(&ControlConfig::default());

        let Json(resp) =
            command_handler(State(state.clone()), Json(CommandDescriptor::Token("toggleIrrigador_ON".into()))).await;
        assert_eq!(resp["pending_commands"], 1);

        command_handler(
            State(state.clone()),
            Json(CommandDescriptor::Directive { command: "set_auto_mode".into(), value: Some(true.into()) }),
        )
        .await;
        assert_eq!(state.actuators.snapshot().await.auto_pilot, Switch::On);
        assert_eq!(state.queue.len(), 1);
    }
}
