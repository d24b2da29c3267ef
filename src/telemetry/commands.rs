//! One-shot button pulses injected into the next published message
//!
//! Used to tap the robot's mode buttons without a physical controller:
//! `Active` raises L1, `Trot` raises R1, each for exactly one message.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::message::TelemetryMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Toggle activation (L1)
    Active,
    /// Toggle trot gait (R1)
    Trot,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Command::Active),
            "trot" => Ok(Command::Trot),
            other => Err(format!("unknown command '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingPulses {
    pub l1: bool,
    pub r1: bool,
}

impl PendingPulses {
    pub fn is_empty(&self) -> bool {
        !self.l1 && !self.r1
    }

    /// Raises the pulsed buttons on an outgoing message
    pub fn apply(&self, message: &mut TelemetryMessage) {
        if self.l1 {
            message.l1 = 1;
        }
        if self.r1 {
            message.r1 = 1;
        }
    }
}

/// Shared latch between the console and the publisher
#[derive(Clone, Debug, Default)]
pub struct CommandLatch {
    pending: Arc<Mutex<PendingPulses>>,
}

impl CommandLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self, command: Command) {
        let mut pending = self.pending.lock().unwrap_or_else(|p| p.into_inner());
        match command {
            Command::Active => pending.l1 = true,
            Command::Trot => pending.r1 = true,
        }
        debug!("Latched {:?} for next message", command);
    }

    /// Returns pending pulses and clears them
    pub fn take(&self) -> PendingPulses {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(|p| p.into_inner()))
    }
}
