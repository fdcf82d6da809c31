//! ==============================================================================
//! main.rs - greenhouse edge relay entry point
//! ==============================================================================
//!
//! purpose:
//!     sits between the greenhouse microcontroller (usb serial) and the cloud
//!     service. reads telemetry, runs the auto-pilot, sends actuator commands
//!     back to the board and keeps the cloud informed.
//!
//! responsibilities:
//!     - load configuration (config/edge.toml + environment)
//!     - open the serial link to the board
//!     - spawn one task per worker, sharing an explicit EdgeState
//!     - release the serial port on ctrl-c / SIGTERM
//!
//! architecture:
//!
//!     ┌──────────────────────────────────────────────────────────────┐
//!     │                      edge relay (this file)                  │
//!     │                                                              │
//!     │  serial rx ─► ingestor ─► latest reading ─► auto-pilot       │
//!     │                  │                              │            │
//!     │                  ▼ (significant)                ▼            │
//!     │            live publisher              ┌──► command queue    │
//!     │                                        │         │           │
//!     │  remote poller (10s) ──────────────────┤         ▼           │
//!     │  control api (manual) ─────────────────┘     dispatcher ─► serial tx
//!     │                                                  │           │
//!     │  snapshot publisher (300s) ◄─ counters     actuator state    │
//!     └──────────────────────────────────────────────────────────────┘
//!
//! failure model:
//!     no worker ever stops the process. if the board is missing at startup
//!     the device workers are skipped and the rest keep running.
//!
//! ==============================================================================

use anyhow::Result;
use greenhouse_edge::{
    api,
    autopilot::AutoPilot,
    cloud::{CloudApi, HttpCloud},
    config::EdgeConfig,
    device,
    dispatcher::CommandDispatcher,
    ingest::Ingestor,
    poller::RemoteCommandPoller,
    publisher::{LivePublisher, SnapshotPublisher},
    state::EdgeState,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

#[tokio::main]
async fn main() -> Result<()> {
    // config decides the log level, so it is loaded under a temporary subscriber
    let mut config = tracing::subscriber::with_default(
        tracing_subscriber::fmt().with_target(false).finish(),
        EdgeConfig::load_or_default,
    );
    config.apply_env();
    init_tracing(&config.logging.level);
    config.validate()?;

    tracing::info!("===========================================================");
    tracing::info!("  Greenhouse Edge Relay v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("===========================================================");
    config.print_summary();

    let (state, latest_tx) = EdgeState::new(&config.control);
    let cloud: Arc<dyn CloudApi> = Arc::new(HttpCloud::new(&config.cloud)?);
    let device_id = config.cloud.device_id.clone();
    let timing = config.timing.clone();
    let mut workers = JoinSet::new();

    // device workers
    match device::open(&config.device).await {
        Ok((reader, sink)) => {
            let (live_tx, live_rx) = mpsc::channel(timing.live_queue);
            let ingestor = Ingestor::new(latest_tx, state.actuators.clone(), Some(live_tx), timing.ingest_idle())
                .show_sensor_data(config.logging.show_sensor_data);
            workers.spawn(ingestor.run(reader));
            workers.spawn(LivePublisher::new(cloud.clone(), device_id.clone(), live_rx).run());
            workers.spawn(AutoPilot::new(&state, config.control.invert_humidity, timing.autopilot_period()).run());
            workers.spawn(
                CommandDispatcher::new(sink, &state, timing.dispatch_interval(), timing.dispatch_idle()).run(),
            );
            tracing::info!("[STARTUP] ✓ device workers running");
        }
        Err(e) => {
            tracing::error!("[STARTUP] {}; device workers not started", e);
        }
    }

    // cloud-facing workers run with or without the board
    workers.spawn(RemoteCommandPoller::new(cloud.clone(), device_id.clone(), &state, timing.poll_period()).run());
    workers.spawn(SnapshotPublisher::new(cloud.clone(), device_id, &state, timing.snapshot_period()).run());

    if config.api.enabled {
        let api_state = state.clone();
        let bind = config.api.bind.clone();
        workers.spawn(async move {
            if let Err(e) = api::run_server(api_state, &bind).await {
                tracing::error!("control api stopped: {:#}", e);
            }
        });
    }

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            Some(res) = workers.join_next() => match res {
                Ok(()) => tracing::warn!("a worker finished; {} still running", workers.len()),
                Err(e) if e.is_panic() => tracing::error!("a worker panicked: {}", e),
                Err(_) => {}
            },
        }
    }

    tracing::info!("shutting down...");
    // aborting the tasks drops both halves of the serial port
    workers.shutdown().await;
    tracing::info!("all workers stopped, serial port released");
    Ok(())
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("ctrl-c handler failed: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("SIGTERM handler failed: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
