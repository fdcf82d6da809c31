//! greenhouse edge relay
//!
//! reads sensor lines from the microcontroller, runs the auto-pilot, feeds
//! commands back to the board and keeps the cloud service up to date.
//! main.rs wires the workers together; everything here is usable on its own.

pub mod actuators;
pub mod api;
pub mod autopilot;
pub mod cloud;
pub mod commands;
pub mod config;
pub mod device;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod poller;
pub mod publisher;
pub mod state;
