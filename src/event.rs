//! Event records flowing through the funnel.
//!
//! Every device worker converts raw reads into [`EventRecord`]s. A record is
//! stamped once at creation, shaped by its source family, and never mutated
//! afterwards; consumers copy what they need.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Device family a worker belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Family {
    Hid,
    Serial,
    Usb,
    /// Global keyboard/mouse hook (one worker, two event kinds).
    Hooks,
}

impl Family {
    pub fn as_str(&self) -> &'static str {
        match self {
            Family::Hid => "HID",
            Family::Serial => "SERIAL",
            Family::Usb => "USB",
            Family::Hooks => "HOOKS",
        }
    }
}

impl std::fmt::Display for Family {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tag identifying how an event's payload is shaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Hid,
    Serial,
    Usb,
    Keyboard,
    Mouse,
    /// Worker lifecycle notification, not device data.
    Status,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Hid => "HID",
            EventKind::Serial => "SERIAL",
            EventKind::Usb => "USB",
            EventKind::Keyboard => "KBD",
            EventKind::Mouse => "MOUSE",
            EventKind::Status => "STATUS",
        }
    }

    /// True for device data, false for lifecycle notifications.
    pub fn is_device_event(&self) -> bool {
        !matches!(self, EventKind::Status)
    }
}

/// Why a worker left the streaming state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// `stop()` was requested from outside.
    Requested,
    /// The device could not be opened; the worker never streamed.
    OpenFailed,
    /// A read failed mid-stream.
    ReadFailed,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Requested => write!(f, "stop requested"),
            StopReason::OpenFailed => write!(f, "open failed"),
            StopReason::ReadFailed => write!(f, "read failed"),
        }
    }
}

/// Mouse activity reported by the global hook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MouseAction {
    Move { x: f64, y: f64 },
    Button { button: String, pressed: bool },
    Wheel { delta_x: i64, delta_y: i64 },
}

/// Family-shaped event payload. Consumers must dispatch on the variant (or
/// [`EventPayload::kind`]) before interpreting the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    /// One HID input report. `human` is a best-effort annotation and its
    /// absence is not an error.
    Hid {
        report: Vec<u8>,
        human: Option<String>,
    },
    /// One line from a serial port, lossily decoded.
    Serial { text: String },
    /// Bytes read from one USB endpoint.
    Usb { endpoint: u8, data: Vec<u8> },
    /// A key press or release from the global hook.
    Keyboard { key: String, pressed: bool },
    /// Mouse activity from the global hook.
    Mouse { action: MouseAction },
    /// A worker left its streaming loop. Lets the consumer reflect worker
    /// death instead of only observing the absence of further events.
    WorkerStopped { family: Family, reason: StopReason },
}

impl EventPayload {
    /// Build a HID payload, deriving the boot-keyboard annotation when the
    /// report is long enough (3rd byte is the first keycode slot).
    pub fn hid_report(report: Vec<u8>) -> Self {
        let human = if report.len() >= 3 {
            Some(format!("keycode {}", report[2]))
        } else {
            None
        };
        EventPayload::Hid { report, human }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::Hid { .. } => EventKind::Hid,
            EventPayload::Serial { .. } => EventKind::Serial,
            EventPayload::Usb { .. } => EventKind::Usb,
            EventPayload::Keyboard { .. } => EventKind::Keyboard,
            EventPayload::Mouse { .. } => EventKind::Mouse,
            EventPayload::WorkerStopped { .. } => EventKind::Status,
        }
    }

    /// One-line description used for the visible log.
    pub fn summary(&self) -> String {
        match self {
            EventPayload::Hid { report, human } => {
                let hex = to_hex(report);
                match human {
                    Some(h) => format!("report {hex} ({h})"),
                    None => format!("report {hex}"),
                }
            }
            EventPayload::Serial { text } => text.clone(),
            EventPayload::Usb { endpoint, data } => {
                format!("ep 0x{endpoint:02x}: {}", to_hex(data))
            }
            EventPayload::Keyboard { key, pressed } => {
                format!("{key} {}", if *pressed { "down" } else { "up" })
            }
            EventPayload::Mouse { action } => match action {
                MouseAction::Move { x, y } => format!("move ({x:.0}, {y:.0})"),
                MouseAction::Button { button, pressed } => {
                    format!("{button} {}", if *pressed { "down" } else { "up" })
                }
                MouseAction::Wheel { delta_x, delta_y } => {
                    format!("wheel ({delta_x}, {delta_y})")
                }
            },
            EventPayload::WorkerStopped { family, reason } => {
                format!("{family} worker stopped: {reason}")
            }
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Immutable, timestamped, tagged unit of data flowing through the funnel.
///
/// Created by exactly one worker at the moment a read yields data; ownership
/// moves to the queue on push and to the consumer on pop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Assigned by the producing worker at creation. Non-decreasing within a
    /// single worker; no ordering is guaranteed across workers.
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl EventRecord {
    /// Stamp a payload with the current time.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}
