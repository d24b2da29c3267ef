//! Wire payloads
//!
//! Outbound [`TelemetryMessage`] is a flat JSON object, one key per channel
//! plus `message_rate`. Inbound control messages are schema-free JSON.

use serde::{Deserialize, Serialize};

use super::TelemetryError;
use crate::controller::InputSnapshot;

/// Default publish rate in messages per second
pub const MESSAGE_RATE: u32 = 20;

/// One published telemetry datagram
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryMessage {
    pub lx: f32,
    pub ly: f32,
    pub rx: f32,
    pub ry: f32,
    #[serde(rename = "R1")]
    pub r1: u8,
    #[serde(rename = "R2")]
    pub r2: f32,
    #[serde(rename = "L1")]
    pub l1: u8,
    #[serde(rename = "L2")]
    pub l2: f32,
    pub dpadx: f32,
    pub dpady: f32,
    pub x: u8,
    pub square: u8,
    pub circle: u8,
    pub triangle: u8,
    pub message_rate: u32,
}

impl TelemetryMessage {
    /// Copies each channel into its wire field
    pub fn from_snapshot(snapshot: &InputSnapshot, message_rate: u32) -> Self {
        Self {
            lx: snapshot.left_x,
            ly: snapshot.left_y,
            rx: snapshot.right_x,
            ry: snapshot.right_y,
            r1: snapshot.r1,
            r2: snapshot.right_trigger,
            l1: snapshot.l1,
            l2: snapshot.left_trigger,
            dpadx: snapshot.dpad_x,
            dpady: snapshot.dpad_y,
            x: snapshot.cross,
            square: snapshot.square,
            circle: snapshot.circle,
            triangle: snapshot.triangle,
            message_rate,
        }
    }

    /// Sticks centered, triggers released, no buttons
    pub fn neutral(message_rate: u32) -> Self {
        Self::from_snapshot(&InputSnapshot::zeroed(), message_rate)
    }

    pub fn encode(&self) -> Result<Vec<u8>, TelemetryError> {
        serde_json::to_vec(self).map_err(TelemetryError::Encode)
    }

    pub fn decode(payload: &[u8]) -> Result<Self, TelemetryError> {
        serde_json::from_slice(payload).map_err(TelemetryError::Decode)
    }
}

/// Inbound message from the control port
///
/// Nothing acts on these yet; they are decoded so they can be logged.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlMessage(pub serde_json::Value);

impl ControlMessage {
    pub fn decode(payload: &[u8]) -> Result<Self, TelemetryError> {
        serde_json::from_slice(payload)
            .map(ControlMessage)
            .map_err(TelemetryError::Decode)
    }
}
