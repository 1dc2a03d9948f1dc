//! Integration tests for the event funnel: workers on one side, a session
//! consumer on the other, exercised through the public API only.

use devmon::event::{EventKind, EventPayload, EventRecord, Family};
use devmon::funnel::{funnel, EventSink};
use devmon::session::{LogLevel, MonitorSession};
use devmon::worker::{DeviceDriver, PollOutcome, PollWorker, WorkerControl, WorkerError, WorkerState};
use std::thread;
use std::time::{Duration, Instant};

/// Plays back a fixed list of payloads, one per poll, then idles.
struct PlaybackDriver {
    family: Family,
    payloads: Vec<EventPayload>,
    next: usize,
}

impl PlaybackDriver {
    fn new(family: Family, payloads: Vec<EventPayload>) -> Self {
        Self {
            family,
            payloads,
            next: 0,
        }
    }
}

impl DeviceDriver for PlaybackDriver {
    type Handle = ();

    fn family(&self) -> Family {
        self.family
    }

    fn describe(&self) -> String {
        format!("playback {}", self.family)
    }

    fn open(&mut self) -> Result<(), WorkerError> {
        Ok(())
    }

    fn poll(&mut self, _handle: &mut (), sink: &EventSink) -> Result<PollOutcome, WorkerError> {
        if self.next < self.payloads.len() {
            let payload = self.payloads[self.next].clone();
            self.next += 1;
            sink.push(EventRecord::new(payload));
            Ok(PollOutcome::Events)
        } else {
            Ok(PollOutcome::Idle)
        }
    }
}

fn wait_until(deadline_ms: u64, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_millis(deadline_ms);
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_hid_reports_flow_through_in_order() {
    let (sink, drain) = funnel();

    let reports = vec![vec![0u8], vec![0, 0, 30], vec![0, 0, 44, 0, 0]];
    let payloads: Vec<_> = reports
        .iter()
        .cloned()
        .map(EventPayload::hid_report)
        .collect();
    let mut worker = PollWorker::new(PlaybackDriver::new(Family::Hid, payloads), sink);
    worker.start().unwrap();

    let mut session = MonitorSession::new(drain);
    wait_until(2_000, || {
        session.poll();
        session.entries().len() >= reports.len()
    });
    worker.stop();
    session.poll();

    let hid: Vec<_> = session
        .entries()
        .iter()
        .filter(|e| e.level == LogLevel::Event)
        .collect();
    assert_eq!(hid.len(), 3);

    // One log line per report, in push order, with the keycode annotation
    // only where the report is long enough to carry one.
    assert!(hid[0].text.contains("report 00"));
    assert!(!hid[0].text.contains("keycode"));
    assert!(hid[1].text.contains("(keycode 30)"));
    assert!(hid[2].text.contains("(keycode 44)"));
}

#[test]
fn test_two_producers_one_drain() {
    let (sink, drain) = funnel();

    let serial_lines = vec![
        EventPayload::Serial {
            text: "ping 1".into(),
        },
        EventPayload::Serial {
            text: "ping 2".into(),
        },
    ];
    let mut worker = PollWorker::new(PlaybackDriver::new(Family::Serial, serial_lines), sink.clone());
    worker.start().unwrap();

    // Second producer pushes directly from a plain thread, like the hook
    // callback does.
    let hook_sink = sink.clone();
    let hooks = thread::spawn(move || {
        for i in 0..5 {
            hook_sink.push(EventRecord::new(EventPayload::Keyboard {
                key: format!("Key{i}"),
                pressed: true,
            }));
        }
    });
    hooks.join().unwrap();

    // Drain incrementally until both serial lines have crossed the funnel,
    // then shut the worker down and pick up its status record.
    let mut records = Vec::new();
    wait_until(2_000, || {
        records.extend(drain.drain());
        records
            .iter()
            .filter(|r| r.kind() == EventKind::Serial)
            .count()
            >= 2
    });
    worker.stop();
    assert_eq!(worker.state(), WorkerState::Stopped);
    records.extend(drain.drain());
    let serial = records
        .iter()
        .filter(|r| r.kind() == EventKind::Serial)
        .count();
    let keys = records
        .iter()
        .filter(|r| r.kind() == EventKind::Keyboard)
        .count();
    let status = records
        .iter()
        .filter(|r| r.kind() == EventKind::Status)
        .count();
    assert_eq!(serial, 2);
    assert_eq!(keys, 5);
    assert_eq!(status, 1);

    // One drain empties the queue; the next sees nothing.
    assert!(drain.drain().is_empty());
}

#[test]
fn test_session_export_after_mixed_traffic() {
    let (sink, drain) = funnel();

    sink.push(EventRecord::new(EventPayload::Serial {
        text: "hello, world".into(),
    }));
    sink.push(EventRecord::new(EventPayload::Keyboard {
        key: "Escape".into(),
        pressed: false,
    }));

    let mut session = MonitorSession::new(drain);
    session.note("session started");
    assert_eq!(session.poll(), 2);

    let dir = std::env::temp_dir().join(format!("devmon-it-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let csv = dir.join("events.csv");
    session.export_csv(&csv).unwrap();

    let body = std::fs::read_to_string(&csv).unwrap();
    let mut lines = body.lines();
    assert_eq!(lines.next(), Some("timestamp,level,text"));
    // The serial line contains a comma, so the text field must be quoted.
    assert!(body.contains("\"[SERIAL] hello, world\""));
    assert!(body.contains("[KBD] Escape up"));
    assert_eq!(lines.count(), 3);

    std::fs::remove_dir_all(&dir).ok();
}
