//! Telemetry subsystem: UDP publish loop and its inputs
//!
//! ```text
//! SnapshotCell ──┐
//!                ├──► TelemetryPublisher ──(UDP 8830)──► robot
//! CommandLatch ──┘            ▲
//!      ▲                      └──(UDP 8840)── control messages
//!   console
//! ```

pub mod commands;
pub mod console;
pub mod message;
pub mod publisher;

use std::net::SocketAddr;

pub use commands::{Command, CommandLatch};
pub use message::{ControlMessage, TelemetryMessage};
pub use publisher::{PublisherSettings, PublisherStats, TelemetryPublisher};

/// Errors from the telemetry sockets and payload codec
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("Failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode message: {0}")]
    Decode(#[source] serde_json::Error),
}
