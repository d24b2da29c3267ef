//! Input snapshot and the shared cell both tasks hold
//!
//! The reader is the only writer and updates one channel at a time; the
//! publisher copies the whole snapshot out under the same lock. A reader of
//! the cell may see a snapshot between two channel writes of the same
//! physical motion, which the fixed-rate publish smooths over.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use super::channels::{Channel, ChannelValue};

/// Default radial deadzone for both sticks
pub const DEFAULT_DEADZONE: f32 = 0.14;

/// Current value of every input channel
///
/// One field per channel, so a snapshot can never be missing a key.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct InputSnapshot {
    pub left_x: f32,
    pub left_y: f32,
    pub right_x: f32,
    pub right_y: f32,
    pub left_trigger: f32,
    pub right_trigger: f32,
    pub dpad_x: f32,
    pub dpad_y: f32,
    pub cross: u8,
    pub circle: u8,
    pub square: u8,
    pub triangle: u8,
    pub l1: u8,
    pub r1: u8,
}

impl InputSnapshot {
    /// All channels at rest
    pub fn zeroed() -> Self {
        Self::default()
    }

    /// Writes one normalized value into its channel
    ///
    /// Returns `false`, leaving the snapshot untouched, when the value does
    /// not have the channel's shape.
    pub fn set(&mut self, channel: Channel, value: ChannelValue) -> bool {
        match value {
            ChannelValue::Analog(v) => self.axis_mut(channel).map(|slot| *slot = v).is_some(),
            ChannelValue::Digital(v) => self.button_mut(channel).map(|slot| *slot = v).is_some(),
        }
    }

    fn axis_mut(&mut self, channel: Channel) -> Option<&mut f32> {
        match channel {
            Channel::LeftStickX => Some(&mut self.left_x),
            Channel::LeftStickY => Some(&mut self.left_y),
            Channel::RightStickX => Some(&mut self.right_x),
            Channel::RightStickY => Some(&mut self.right_y),
            Channel::LeftTrigger => Some(&mut self.left_trigger),
            Channel::RightTrigger => Some(&mut self.right_trigger),
            Channel::DpadX => Some(&mut self.dpad_x),
            Channel::DpadY => Some(&mut self.dpad_y),
            _ => None,
        }
    }

    fn button_mut(&mut self, channel: Channel) -> Option<&mut u8> {
        match channel {
            Channel::Cross => Some(&mut self.cross),
            Channel::Circle => Some(&mut self.circle),
            Channel::Square => Some(&mut self.square),
            Channel::Triangle => Some(&mut self.triangle),
            Channel::L1 => Some(&mut self.l1),
            Channel::R1 => Some(&mut self.r1),
            _ => None,
        }
    }

    /// Snaps each stick pair to the origin when its magnitude is below `threshold`
    ///
    /// Left and right pairs are judged independently.
    pub fn apply_deadzone(&mut self, threshold: f32) {
        radial_deadzone(&mut self.left_x, &mut self.left_y, threshold);
        radial_deadzone(&mut self.right_x, &mut self.right_y, threshold);
    }

    /// Single-channel update followed by deadzone re-evaluation of both sticks
    pub fn ingest(&mut self, channel: Channel, value: ChannelValue, threshold: f32) {
        self.set(channel, value);
        self.apply_deadzone(threshold);
    }
}

fn radial_deadzone(x: &mut f32, y: &mut f32, threshold: f32) {
    if x.hypot(*y) < threshold {
        *x = 0.0;
        *y = 0.0;
    }
}

/// Shared, lock-guarded slot holding the snapshot or its absence
///
/// `None` means no device is connected. Cloning the cell shares the slot.
#[derive(Clone, Debug, Default)]
pub struct SnapshotCell {
    inner: Arc<Mutex<Option<InputSnapshot>>>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the guard leaves a plain-data snapshot behind,
    // which is still usable.
    fn lock(&self) -> MutexGuard<'_, Option<InputSnapshot>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts a fresh all-zero snapshot, discarding any previous one
    pub fn connect(&self) {
        *self.lock() = Some(InputSnapshot::zeroed());
        info!("Input snapshot reset for newly connected device");
    }

    /// Marks the device as absent
    pub fn disconnect(&self) {
        if self.lock().take().is_some() {
            info!("Input snapshot discarded");
        }
    }

    /// Applies one channel update; returns `false` when no snapshot exists
    pub fn update(&self, channel: Channel, value: ChannelValue, deadzone: f32) -> bool {
        let mut guard = self.lock();
        match guard.as_mut() {
            Some(snapshot) => {
                snapshot.ingest(channel, value, deadzone);
                debug!("{:?} = {:?} -> {:?}", channel, value, snapshot);
                true
            }
            None => false,
        }
    }

    /// Copy of the current snapshot, `None` while disconnected
    pub fn current(&self) -> Option<InputSnapshot> {
        *self.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().is_some()
    }
}
