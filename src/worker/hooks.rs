//! Global keyboard/mouse hook worker backed by rdev.
//!
//! This family does not poll. Opening registers a global input hook whose
//! callbacks run on a hook-owned thread and push straight into the funnel;
//! the worker thread itself only idles in short cooperative waits until
//! `stop()`. rdev offers no way to unregister a hook once installed, so
//! stopping mutes the callbacks through an atomic gate instead.

use crate::config::HookConfig;
use crate::event::{EventPayload, EventRecord, Family, MouseAction, StopReason};
use crate::funnel::EventSink;
use crate::worker::{StateCell, WorkerControl, WorkerError, WorkerState};
use rdev::EventType;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{info, warn};

/// How long to wait for the hook installation to report failure before
/// assuming it is in place and blocking in its dispatch loop.
const INSTALL_GRACE: Duration = Duration::from_millis(300);

/// Idle wait between stop-flag checks.
const IDLE_WAIT: Duration = Duration::from_millis(200);

/// Captures global keyboard and mouse events system-wide.
pub struct HookWorker {
    config: HookConfig,
    sink: EventSink,
    stop: Arc<AtomicBool>,
    gate: Arc<AtomicBool>,
    state: Arc<StateCell>,
    thread: Option<JoinHandle<()>>,
    started: bool,
}

impl HookWorker {
    pub fn new(config: HookConfig, sink: EventSink) -> Self {
        Self {
            config,
            sink,
            stop: Arc::new(AtomicBool::new(false)),
            gate: Arc::new(AtomicBool::new(false)),
            state: Arc::new(StateCell::new()),
            thread: None,
            started: false,
        }
    }
}

impl WorkerControl for HookWorker {
    fn family(&self) -> Family {
        Family::Hooks
    }

    fn state(&self) -> WorkerState {
        self.state.get()
    }

    /// Install the global hook and begin streaming callback events. One
    /// shot: a stopped hook worker cannot be restarted, because the old
    /// hook thread cannot be torn down and would double up on a new one.
    fn start(&mut self) -> Result<(), WorkerError> {
        if self.started {
            return Err(WorkerError::AlreadyRunning);
        }
        self.started = true;

        self.state.set(WorkerState::Opening);
        self.gate.store(true, Ordering::SeqCst);

        let config = self.config.clone();
        let sink = self.sink.clone();
        let stop = self.stop.clone();
        let gate = self.gate.clone();
        let state = self.state.clone();

        let handle = match thread::Builder::new()
            .name("hooks-worker".to_string())
            .spawn(move || run_hooks(config, sink, stop, gate, state))
        {
            Ok(handle) => handle,
            Err(e) => {
                self.gate.store(false, Ordering::SeqCst);
                self.state.set(WorkerState::Stopped);
                return Err(e.into());
            }
        };
        self.thread = Some(handle);
        Ok(())
    }

    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        match self.thread.take() {
            Some(handle) => {
                let _ = handle.join();
            }
            None => self.state.set(WorkerState::Stopped),
        }
    }
}

impl Drop for HookWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_hooks(
    config: HookConfig,
    sink: EventSink,
    stop: Arc<AtomicBool>,
    gate: Arc<AtomicBool>,
    state: Arc<StateCell>,
) {
    let (err_tx, err_rx) = crossbeam_channel::bounded(1);

    // The hook thread blocks inside rdev's dispatch loop for the rest of the
    // process lifetime; the gate is the only way to quiet it.
    {
        let config = config.clone();
        let sink = sink.clone();
        let gate = gate.clone();
        thread::spawn(move || {
            let result = rdev::listen(move |event| {
                if !gate.load(Ordering::Relaxed) {
                    return;
                }
                if let Some(payload) = translate(&config, &event.event_type) {
                    sink.push(EventRecord::new(payload));
                }
            });
            if let Err(e) = result {
                let _ = err_tx.send(format!("{e:?}"));
            }
        });
    }

    // listen() only returns on failure; silence within the grace period
    // means the hook is installed and dispatching.
    let install_failure = match err_rx.recv_timeout(INSTALL_GRACE) {
        Ok(detail) => Some(detail),
        Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
            Some("hook thread exited without reporting".to_string())
        }
        Err(crossbeam_channel::RecvTimeoutError::Timeout) => None,
    };
    if let Some(detail) = install_failure {
        warn!(error = %detail, "failed to install input hooks");
        gate.store(false, Ordering::SeqCst);
        sink.push(EventRecord::new(EventPayload::WorkerStopped {
            family: Family::Hooks,
            reason: StopReason::OpenFailed,
        }));
        state.set(WorkerState::Stopped);
        return;
    }

    state.set(WorkerState::Streaming);
    info!("input hooks installed");

    let mut reason = StopReason::Requested;
    while !stop.load(Ordering::SeqCst) {
        // The hook thread dying mid-stream is a read failure.
        if err_rx.try_recv().is_ok() {
            warn!("input hook thread exited unexpectedly");
            reason = StopReason::ReadFailed;
            break;
        }
        thread::sleep(IDLE_WAIT);
    }

    state.set(WorkerState::Stopping);
    gate.store(false, Ordering::SeqCst);
    sink.push(EventRecord::new(EventPayload::WorkerStopped {
        family: Family::Hooks,
        reason,
    }));
    state.set(WorkerState::Stopped);
    info!("hook worker stopped");
}

/// Map a hook callback to an event payload, honoring the capture toggles.
fn translate(config: &HookConfig, event_type: &EventType) -> Option<EventPayload> {
    match event_type {
        EventType::KeyPress(key) if config.keyboard => Some(EventPayload::Keyboard {
            key: format!("{key:?}"),
            pressed: true,
        }),
        EventType::KeyRelease(key) if config.keyboard => Some(EventPayload::Keyboard {
            key: format!("{key:?}"),
            pressed: false,
        }),
        EventType::ButtonPress(button) if config.mouse => Some(EventPayload::Mouse {
            action: MouseAction::Button {
                button: format!("{button:?}"),
                pressed: true,
            },
        }),
        EventType::ButtonRelease(button) if config.mouse => Some(EventPayload::Mouse {
            action: MouseAction::Button {
                button: format!("{button:?}"),
                pressed: false,
            },
        }),
        EventType::MouseMove { x, y } if config.mouse => Some(EventPayload::Mouse {
            action: MouseAction::Move { x: *x, y: *y },
        }),
        EventType::Wheel { delta_x, delta_y } if config.mouse => Some(EventPayload::Mouse {
            action: MouseAction::Wheel {
                delta_x: *delta_x,
                delta_y: *delta_y,
            },
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funnel::funnel;
    use rdev::{Button, Key};

    #[test]
    fn test_stopped_hook_worker_cannot_restart() {
        let (sink, _drain) = funnel();
        let mut worker = HookWorker::new(HookConfig::default(), sink);

        worker.start().unwrap();
        worker.stop();
        assert_eq!(worker.state(), WorkerState::Stopped);

        // The old hook thread cannot be unregistered, so a second start
        // would stack a duplicate hook; it must be rejected.
        assert!(matches!(worker.start(), Err(WorkerError::AlreadyRunning)));
        assert_eq!(worker.state(), WorkerState::Stopped);
    }

    #[test]
    fn test_translate_respects_keyboard_toggle() {
        let config = HookConfig {
            keyboard: false,
            mouse: true,
        };
        assert!(translate(&config, &EventType::KeyPress(Key::KeyA)).is_none());
        assert!(translate(&config, &EventType::MouseMove { x: 1.0, y: 2.0 }).is_some());
    }

    #[test]
    fn test_translate_respects_mouse_toggle() {
        let config = HookConfig {
            keyboard: true,
            mouse: false,
        };
        assert!(translate(&config, &EventType::ButtonPress(Button::Left)).is_none());
        assert!(translate(&config, &EventType::Wheel { delta_x: 0, delta_y: 1 }).is_none());

        match translate(&config, &EventType::KeyRelease(Key::Escape)) {
            Some(EventPayload::Keyboard { key, pressed }) => {
                assert_eq!(key, "Escape");
                assert!(!pressed);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_translate_mouse_move_carries_position() {
        let config = HookConfig::default();
        match translate(&config, &EventType::MouseMove { x: 10.5, y: 20.25 }) {
            Some(EventPayload::Mouse {
                action: MouseAction::Move { x, y },
            }) => {
                assert_eq!(x, 10.5);
                assert_eq!(y, 20.25);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}
