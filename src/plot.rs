//! In-memory plot buffers fed by the consumer.
//!
//! These hold the data behind the two live plots: an event timeline (key
//! activity vs mouse activity over time) and a mouse trace of recent cursor
//! positions. Rendering is left to whatever front end consumes them.

use crate::event::{EventKind, EventPayload, EventRecord, MouseAction};
use chrono::{DateTime, Utc};

/// One point of the mouse trace.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MousePoint {
    pub x: f64,
    pub y: f64,
    pub at: DateTime<Utc>,
}

/// Timeline and trace buffers, owned by the consumer thread.
#[derive(Debug, Default)]
pub struct PlotBuffers {
    key_times: Vec<DateTime<Utc>>,
    mouse_times: Vec<DateTime<Utc>>,
    trace: Vec<MousePoint>,
}

impl PlotBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the plottable parts of a record into the buffers. HID and
    /// keyboard records mark the key timeline; mouse records mark the mouse
    /// timeline and, for moves, extend the trace. Serial, USB, and status
    /// records are not plotted.
    pub fn record(&mut self, record: &EventRecord) {
        match record.kind() {
            EventKind::Hid | EventKind::Keyboard => self.key_times.push(record.timestamp),
            EventKind::Mouse => {
                self.mouse_times.push(record.timestamp);
                if let EventPayload::Mouse {
                    action: MouseAction::Move { x, y },
                } = &record.payload
                {
                    self.trace.push(MousePoint {
                        x: *x,
                        y: *y,
                        at: record.timestamp,
                    });
                }
            }
            _ => {}
        }
    }

    pub fn key_timeline(&self) -> &[DateTime<Utc>] {
        &self.key_times
    }

    pub fn mouse_timeline(&self) -> &[DateTime<Utc>] {
        &self.mouse_times
    }

    /// The most recent `n` trace points, oldest first.
    pub fn recent_trace(&self, n: usize) -> &[MousePoint] {
        let start = self.trace.len().saturating_sub(n);
        &self.trace[start..]
    }
}
