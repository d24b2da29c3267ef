//! Gamepad-to-UDP telemetry relay
//!
//! [`controller`] keeps a normalized snapshot of one gamepad current;
//! [`telemetry`] publishes it at a fixed rate and listens for control
//! messages; [`config`] loads both from TOML.

pub mod config;
pub mod controller;
pub mod telemetry;
