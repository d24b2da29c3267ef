//! Device discovery and raw event streams
//!
//! [`DeviceSource`] finds a controller by its display name and opens an
//! [`EventStream`] on it. Both calls may block; the reader runs them on the
//! blocking pool. [`EvdevSource`] is the Linux implementation.

use evdev::{Device, EventType};
use tracing::{debug, info};

use super::channels::{EventKind, RawInputEvent};

/// Errors from device discovery and event reads
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// Read or open failed, typically because the device was unplugged
    #[error("Device I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The event stream ended without an I/O error
    #[error("Event stream closed")]
    StreamClosed,

    /// The blocking worker running a device call went away
    #[error("Device worker failed: {0}")]
    Worker(String),
}

/// Finds a controller by name
pub trait DeviceSource: Send {
    /// Scans once; `Ok(None)` when nothing with that name is present
    fn find(&mut self, name: &str) -> Result<Option<Box<dyn EventStream>>, DeviceError>;
}

/// Blocking stream of raw events from one opened device
pub trait EventStream: Send {
    fn name(&self) -> &str;

    /// Blocks until at least one event is available
    fn fetch(&mut self) -> Result<Vec<RawInputEvent>, DeviceError>;
}

/// Scans `/dev/input/event*` through evdev
#[derive(Debug, Default)]
pub struct EvdevSource;

impl DeviceSource for EvdevSource {
    fn find(&mut self, name: &str) -> Result<Option<Box<dyn EventStream>>, DeviceError> {
        for (path, device) in evdev::enumerate() {
            let device_name = device.name().unwrap_or_default().to_string();
            debug!("Found input device {} at {}", device_name, path.display());
            if device_name == name {
                info!("Matched controller {} at {}", device_name, path.display());
                return Ok(Some(Box::new(EvdevStream {
                    name: device_name,
                    device,
                })));
            }
        }
        Ok(None)
    }
}

struct EvdevStream {
    name: String,
    device: Device,
}

impl EventStream for EvdevStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&mut self) -> Result<Vec<RawInputEvent>, DeviceError> {
        let events = self
            .device
            .fetch_events()?
            .map(|event| RawInputEvent {
                kind: event_kind(event.event_type()),
                code: event.code(),
                value: event.value(),
            })
            .collect();
        Ok(events)
    }
}

fn event_kind(event_type: EventType) -> EventKind {
    if event_type == EventType::ABSOLUTE {
        EventKind::Absolute
    } else if event_type == EventType::KEY {
        EventKind::Key
    } else {
        EventKind::Other
    }
}
