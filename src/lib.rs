//! devmon - local device event funnel and monitor.
//!
//! Enumerates local input/communication devices (HID, serial/COM, raw USB,
//! optional global keyboard/mouse hooks), streams events from a selected
//! device through a shared queue, and renders them as a scrolling log plus
//! in-memory plot buffers, with CSV/text export.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           devmon                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐         │
//! │  │ HID      │ │ Serial   │ │ USB      │ │ Hook     │ workers │
//! │  │ worker   │ │ worker   │ │ worker   │ │ worker   │ (1 thd  │
//! │  └────┬─────┘ └────┬─────┘ └────┬─────┘ └────┬─────┘  each)  │
//! │       └────────────┴─────┬──────┴────────────┘               │
//! │                          ▼                                   │
//! │                   ┌─────────────┐     ┌────────────────┐     │
//! │                   │ EventSink / │────▶│ MonitorSession │     │
//! │                   │ EventDrain  │     │ log + plots +  │     │
//! │                   │  (funnel)   │     │ CSV export     │     │
//! │                   └─────────────┘     └────────────────┘     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The funnel is the only shared mutable state: an unbounded
//! multi-producer/single-consumer queue that producers can never block on.
//! Each worker owns its device handle exclusively and stops cooperatively.
//!
//! # Example
//!
//! ```no_run
//! use devmon::{directory, funnel::funnel, session::MonitorSession};
//! use devmon::worker::{HidDriver, PollWorker, WorkerControl};
//!
//! let (sink, drain) = funnel();
//! let mut session = MonitorSession::new(drain);
//!
//! let device = directory::hid_devices().into_iter().next().expect("no HID devices");
//! let mut worker = PollWorker::new(HidDriver::new(device), sink);
//! worker.start().expect("spawn failed");
//!
//! // Drain on a fixed tick from the consumer thread.
//! session.poll();
//! worker.stop();
//! ```

pub mod config;
pub mod directory;
pub mod event;
pub mod funnel;
pub mod plot;
pub mod session;
pub mod worker;

// Re-export key types at crate root for convenience
pub use config::{Config, HookConfig};
pub use directory::{DeviceEntry, DeviceSelector, HidDescriptor, SerialDescriptor, UsbDescriptor};
pub use event::{EventKind, EventPayload, EventRecord, Family, MouseAction, StopReason};
pub use funnel::{funnel, EventDrain, EventSink};
pub use plot::PlotBuffers;
pub use session::{LogEntry, LogLevel, MonitorSession};
pub use worker::{
    DeviceDriver, HidDriver, HookWorker, PollOutcome, PollWorker, SerialDriver, UsbDriver,
    WorkerControl, WorkerError, WorkerState,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
