//! Device workers: one thread of control per open device.
//!
//! Every family (HID, serial, raw USB, global hooks) runs behind the same
//! lifecycle: `Created → Opening → Streaming → Stopping → Stopped`, with
//! `Opening → Stopped` directly when the device cannot be opened. Open and
//! read failures are fatal to the worker instance and are never retried;
//! they surface as log lines and a [`StopReason`] status record pushed
//! through the funnel, never as a panic on another thread.
//!
//! Cancellation is cooperative: `stop()` raises an atomic flag which the
//! worker observes once per loop iteration, so a worker blocked in a device
//! read can take up to its read timeout to notice.

pub mod hid;
pub mod hooks;
pub mod serial;
pub mod usb;

pub use hid::HidDriver;
pub use hooks::HookWorker;
pub use serial::SerialDriver;
pub use usb::UsbDriver;

use crate::event::{EventPayload, EventRecord, Family, StopReason};
use crate::funnel::EventSink;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Sleep between empty reads so the streaming loop does not busy-spin.
pub(crate) const IDLE_SLEEP: Duration = Duration::from_millis(20);

/// Worker lifecycle states. `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Created = 0,
    Opening = 1,
    Streaming = 2,
    Stopping = 3,
    Stopped = 4,
}

/// Lock-free state cell shared between the worker thread and its owner.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new() -> Self {
        StateCell(AtomicU8::new(WorkerState::Created as u8))
    }

    pub(crate) fn set(&self, state: WorkerState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    pub(crate) fn get(&self) -> WorkerState {
        match self.0.load(Ordering::SeqCst) {
            0 => WorkerState::Created,
            1 => WorkerState::Opening,
            2 => WorkerState::Streaming,
            3 => WorkerState::Stopping,
            _ => WorkerState::Stopped,
        }
    }
}

/// Errors raised while opening or reading a device.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("hid: {0}")]
    Hid(#[from] hidapi::HidError),
    #[error("serial: {0}")]
    Serial(#[from] serialport::Error),
    #[error("usb: {0}")]
    Usb(#[from] rusb::Error),
    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),
    #[error("input hook: {0}")]
    Hook(String),
    #[error("device not found: {0}")]
    NotFound(String),
    #[error("worker is already running")]
    AlreadyRunning,
}

/// Result of one bounded read attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// At least one record was pushed to the sink.
    Events,
    /// Nothing to read right now; the worker sleeps briefly.
    Idle,
}

/// Family-specific open/read/close logic, driven by [`PollWorker`].
///
/// `poll` must attempt one bounded-size, short-timeout read and push any
/// resulting records itself; a returned error terminates the worker.
pub trait DeviceDriver: Send + 'static {
    type Handle: Send;

    fn family(&self) -> Family;

    /// Short device label for logs, e.g. `HID 046d:c52b`.
    fn describe(&self) -> String;

    fn open(&mut self) -> Result<Self::Handle, WorkerError>;

    fn poll(
        &mut self,
        handle: &mut Self::Handle,
        sink: &EventSink,
    ) -> Result<PollOutcome, WorkerError>;

    /// Release the handle, pushing any final buffered records first.
    /// Best-effort: implementations swallow close failures. The default
    /// simply drops the handle.
    fn close(&mut self, handle: Self::Handle, sink: &EventSink) {
        let _ = sink;
        drop(handle);
    }
}

/// Uniform control surface over the polling workers and the hook worker.
pub trait WorkerControl: Send {
    fn family(&self) -> Family;
    fn state(&self) -> WorkerState;
    /// Spawn the worker thread and begin opening the device. Fails only
    /// when the thread cannot be spawned or the worker already ran; device
    /// open failures surface later as a status record.
    fn start(&mut self) -> Result<(), WorkerError>;
    /// Request cooperative shutdown and wait for the worker thread to exit.
    /// Safe to call on a worker that was never started.
    fn stop(&mut self);
}

/// Thread-per-device worker for the polling families.
///
/// Owns exactly one device handle for its whole streaming lifetime and a
/// clone of the funnel sink it was constructed with.
pub struct PollWorker<D: DeviceDriver> {
    driver: Option<D>,
    sink: EventSink,
    family: Family,
    label: String,
    stop: Arc<AtomicBool>,
    state: Arc<StateCell>,
    thread: Option<JoinHandle<()>>,
}

impl<D: DeviceDriver> PollWorker<D> {
    pub fn new(driver: D, sink: EventSink) -> Self {
        let family = driver.family();
        let label = driver.describe();
        Self {
            driver: Some(driver),
            sink,
            family,
            label,
            stop: Arc::new(AtomicBool::new(false)),
            state: Arc::new(StateCell::new()),
            thread: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Spawn the worker thread from the given builder. A spawn failure
    /// leaves the worker terminal: the driver is gone and `state` must not
    /// stay parked at `Opening`.
    fn start_with(&mut self, builder: thread::Builder) -> Result<(), WorkerError> {
        let driver = self.driver.take().ok_or(WorkerError::AlreadyRunning)?;

        self.state.set(WorkerState::Opening);
        let sink = self.sink.clone();
        let stop = self.stop.clone();
        let state = self.state.clone();
        let label = self.label.clone();

        let handle = match builder.spawn(move || run_loop(driver, sink, stop, state, label)) {
            Ok(handle) => handle,
            Err(e) => {
                self.state.set(WorkerState::Stopped);
                return Err(e.into());
            }
        };
        self.thread = Some(handle);
        Ok(())
    }
}

impl<D: DeviceDriver> WorkerControl for PollWorker<D> {
    fn family(&self) -> Family {
        self.family
    }

    fn state(&self) -> WorkerState {
        self.state.get()
    }

    fn start(&mut self) -> Result<(), WorkerError> {
        let builder = thread::Builder::new()
            .name(format!("{}-worker", self.family.as_str().to_lowercase()));
        self.start_with(builder)
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        match self.thread.take() {
            Some(handle) => {
                let _ = handle.join();
            }
            // Never started: terminal immediately, nothing to wait for.
            None => self.state.set(WorkerState::Stopped),
        }
    }
}

impl<D: DeviceDriver> Drop for PollWorker<D> {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The shared streaming loop: open, stream, stop.
fn run_loop<D: DeviceDriver>(
    mut driver: D,
    sink: EventSink,
    stop: Arc<AtomicBool>,
    state: Arc<StateCell>,
    label: String,
) {
    let family = driver.family();

    let mut handle = match driver.open() {
        Ok(handle) => {
            info!(device = %label, "device opened");
            handle
        }
        Err(e) => {
            // Open failure is fatal for this worker instance, no retry.
            // Nothing was acquired, so there is nothing to release.
            warn!(device = %label, error = %e, "failed to open device");
            sink.push(EventRecord::new(EventPayload::WorkerStopped {
                family,
                reason: StopReason::OpenFailed,
            }));
            state.set(WorkerState::Stopped);
            return;
        }
    };

    state.set(WorkerState::Streaming);
    let mut reason = StopReason::Requested;

    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        match driver.poll(&mut handle, &sink) {
            Ok(PollOutcome::Events) => {}
            Ok(PollOutcome::Idle) => thread::sleep(IDLE_SLEEP),
            Err(e) => {
                warn!(device = %label, error = %e, "read failed, stopping worker");
                reason = StopReason::ReadFailed;
                break;
            }
        }
    }

    state.set(WorkerState::Stopping);
    driver.close(handle, &sink);
    sink.push(EventRecord::new(EventPayload::WorkerStopped {
        family,
        reason,
    }));
    state.set(WorkerState::Stopped);
    info!(device = %label, "worker stopped");
}
