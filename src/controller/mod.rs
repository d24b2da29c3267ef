//! Controller subsystem: gamepad discovery and input snapshot
//!
//! 1. [`device`] - Device discovery and blocking raw event streams
//! 2. [`channels`] - Raw identifier lookup and value normalization
//! 3. [`snapshot`] - Per-channel state with radial stick deadzone
//! 4. [`reader`] - Reconnecting read loop that keeps the snapshot current
//!
//! # Architecture
//!
//! ```text
//! Gamepad ──► EventStream ──► Channel table ──► SnapshotCell ──► Publisher
//!            (raw events)    (normalize)       (deadzone)
//! ```

pub mod channels;
pub mod device;
pub mod reader;
pub mod snapshot;

pub use channels::{Channel, ChannelValue, EventKind, RawInputEvent};
pub use device::{DeviceError, DeviceSource, EvdevSource, EventStream};
pub use reader::{ReaderHandle, ReaderSettings};
pub use snapshot::{InputSnapshot, SnapshotCell};
