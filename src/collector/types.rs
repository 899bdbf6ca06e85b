//! Contact event types delivered by the pointer driver.
//!
//! The driver reports three kinds of callbacks; each is a variant of
//! [`ContactEvent`]. Event codes follow the driver's integer numbering.

use serde::{Deserialize, Serialize};

/// Driver event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum EventKind {
    Drag,
    Hover,
    Down,
    Up,
    ButtonDown,
    ButtonUp,
    InRange,
    OutOfRange,
    /// Any code the driver may add later
    Unknown(i32),
}

impl EventKind {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => EventKind::Drag,
            2 => EventKind::Hover,
            3 => EventKind::Down,
            4 => EventKind::Up,
            5 => EventKind::ButtonDown,
            6 => EventKind::ButtonUp,
            7 => EventKind::InRange,
            8 => EventKind::OutOfRange,
            other => EventKind::Unknown(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            EventKind::Drag => 1,
            EventKind::Hover => 2,
            EventKind::Down => 3,
            EventKind::Up => 4,
            EventKind::ButtonDown => 5,
            EventKind::ButtonUp => 6,
            EventKind::InRange => 7,
            EventKind::OutOfRange => 8,
            EventKind::Unknown(code) => code,
        }
    }
}

impl From<i32> for EventKind {
    fn from(code: i32) -> Self {
        EventKind::from_code(code)
    }
}

impl From<EventKind> for i32 {
    fn from(kind: EventKind) -> Self {
        kind.code()
    }
}

/// Positional report from a move callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerSample {
    pub device_type: i32,
    pub pointer_id: u32,
    #[serde(rename = "event_type")]
    pub kind: EventKind,
    #[serde(default)]
    pub inverted: bool,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub pressure: i32,
}

/// Non-positional report from a button or range/release callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerSignal {
    pub device_type: i32,
    pub pointer_id: u32,
    #[serde(rename = "event_type")]
    pub kind: EventKind,
    #[serde(default)]
    pub inverted: bool,
}

/// One driver callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "callback", rename_all = "snake_case")]
pub enum ContactEvent {
    Move(PointerSample),
    Button(PointerSignal),
    RangeOrRelease(PointerSignal),
}

impl ContactEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ContactEvent::Move(s) => s.kind,
            ContactEvent::Button(s) | ContactEvent::RangeOrRelease(s) => s.kind,
        }
    }

    pub fn pointer_id(&self) -> u32 {
        match self {
            ContactEvent::Move(s) => s.pointer_id,
            ContactEvent::Button(s) | ContactEvent::RangeOrRelease(s) => s.pointer_id,
        }
    }

    /// Convenience constructor for a move callback.
    pub fn moved(device_type: i32, pointer_id: u32, kind: EventKind, x: f64, y: f64) -> Self {
        ContactEvent::Move(PointerSample {
            device_type,
            pointer_id,
            kind,
            inverted: false,
            x,
            y,
            pressure: 0,
        })
    }

    /// Convenience constructor for a range/release callback.
    pub fn released(device_type: i32, pointer_id: u32, kind: EventKind) -> Self {
        ContactEvent::RangeOrRelease(PointerSignal {
            device_type,
            pointer_id,
            kind,
            inverted: false,
        })
    }
}

/// An event as stored in a replay file, with an optional offset from the
/// start of the recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_ms: Option<u64>,
    #[serde(flatten)]
    pub event: ContactEvent,
}
