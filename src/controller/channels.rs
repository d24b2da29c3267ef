//! Static channel table and ingestion-time normalization
//!
//! Maps raw Linux input event identifiers to the named channels the relay
//! publishes and converts raw integer readings into normalized values.

/// Divisor for signed 16-bit stick axes
pub const STICK_SCALE: f32 = 32768.0;

/// Divisor for 8-bit trigger axes
pub const TRIGGER_SCALE: f32 = 256.0;

/// Raw event category as reported by the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// EV_ABS
    Absolute,
    /// EV_KEY
    Key,
    /// Anything else (sync, misc, ...)
    Other,
}

/// One raw input event, independent of the device backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInputEvent {
    pub kind: EventKind,
    pub code: u16,
    pub value: i32,
}

impl RawInputEvent {
    pub fn absolute(code: u16, value: i32) -> Self {
        Self {
            kind: EventKind::Absolute,
            code,
            value,
        }
    }

    pub fn key(code: u16, value: i32) -> Self {
        Self {
            kind: EventKind::Key,
            code,
            value,
        }
    }

    /// Maps and normalizes the event in one step
    pub fn resolve(&self) -> Option<(Channel, ChannelValue)> {
        Channel::lookup(self.kind, self.code)
            .map(|channel| (channel, channel.normalize(self.value)))
    }
}

/// Named input channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    LeftStickX,
    LeftStickY,
    RightStickX,
    RightStickY,
    LeftTrigger,
    RightTrigger,
    DpadX,
    DpadY,
    Cross,
    Circle,
    Square,
    Triangle,
    L1,
    R1,
}

/// Normalized channel reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChannelValue {
    Analog(f32),
    Digital(u8),
}

// (kind, code) -> channel. Codes are the evdev ABS_* / BTN_* constants.
const CHANNEL_TABLE: &[(EventKind, u16, Channel)] = &[
    (EventKind::Absolute, 0, Channel::LeftStickX),   // ABS_X
    (EventKind::Absolute, 1, Channel::LeftStickY),   // ABS_Y
    (EventKind::Absolute, 2, Channel::LeftTrigger),  // ABS_Z
    (EventKind::Absolute, 3, Channel::RightStickX),  // ABS_RX
    (EventKind::Absolute, 4, Channel::RightStickY),  // ABS_RY
    (EventKind::Absolute, 5, Channel::RightTrigger), // ABS_RZ
    (EventKind::Absolute, 16, Channel::DpadX),       // ABS_HAT0X
    (EventKind::Absolute, 17, Channel::DpadY),       // ABS_HAT0Y
    (EventKind::Key, 304, Channel::Cross),           // BTN_SOUTH
    (EventKind::Key, 305, Channel::Circle),          // BTN_EAST
    (EventKind::Key, 307, Channel::Square),          // BTN_NORTH
    (EventKind::Key, 308, Channel::Triangle),        // BTN_WEST
    (EventKind::Key, 310, Channel::L1),              // BTN_TL
    (EventKind::Key, 311, Channel::R1),              // BTN_TR
];

impl Channel {
    /// Looks up the channel for a raw event identifier, `None` if unmapped
    pub fn lookup(kind: EventKind, code: u16) -> Option<Channel> {
        CHANNEL_TABLE
            .iter()
            .find(|(k, c, _)| *k == kind && *c == code)
            .map(|(_, _, channel)| *channel)
    }

    /// Converts a raw reading into this channel's normalized value
    pub fn normalize(self, raw: i32) -> ChannelValue {
        match self {
            Channel::LeftStickX | Channel::RightStickX => {
                ChannelValue::Analog(raw as f32 / STICK_SCALE)
            }
            // "up" is positive
            Channel::LeftStickY | Channel::RightStickY => {
                ChannelValue::Analog(-(raw as f32) / STICK_SCALE)
            }
            Channel::LeftTrigger | Channel::RightTrigger => {
                ChannelValue::Analog(raw as f32 / TRIGGER_SCALE)
            }
            Channel::DpadX | Channel::DpadY => ChannelValue::Analog(raw as f32),
            // key repeat reports 2 while held
            Channel::Cross
            | Channel::Circle
            | Channel::Square
            | Channel::Triangle
            | Channel::L1
            | Channel::R1 => ChannelValue::Digital(u8::from(raw != 0)),
        }
    }
}
