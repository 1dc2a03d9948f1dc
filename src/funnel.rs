//! The event funnel: a process-wide multi-producer/single-consumer queue.
//!
//! Heterogeneous device workers push [`EventRecord`]s into an [`EventSink`];
//! the UI thread drains them through the matching [`EventDrain`]. The queue
//! is unbounded by policy: producers must never stall on a slow consumer, so
//! there is no backpressure and sustained overload grows the queue without
//! limit. That risk is acknowledged, not mitigated.

use crate::event::EventRecord;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// Create a connected sink/drain pair.
///
/// The sink is cloned into every worker at construction; the drain stays with
/// the single consumer. There is no ambient global queue.
pub fn funnel() -> (EventSink, EventDrain) {
    let (tx, rx) = unbounded();
    (EventSink { tx }, EventDrain { rx })
}

/// Producer side of the funnel. Cheap to clone, safe to share across threads.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<EventRecord>,
}

impl EventSink {
    /// Push a record. Never blocks and never fails; ownership of the record
    /// moves into the queue. A push after the drain has been dropped is
    /// silently discarded (the consumer is gone, nobody will read it).
    pub fn push(&self, record: EventRecord) {
        let _ = self.tx.send(record);
    }
}

/// Consumer side of the funnel. Single-consumer by construction: it is not
/// `Clone` and lives on the UI thread.
#[derive(Debug)]
pub struct EventDrain {
    rx: Receiver<EventRecord>,
}

impl EventDrain {
    /// Pop the oldest unconsumed record without blocking.
    pub fn try_pop(&self) -> Option<EventRecord> {
        self.rx.try_recv().ok()
    }

    /// Pop everything currently queued, in arrival order. Returns immediately
    /// with an empty vec when the queue is empty.
    pub fn drain(&self) -> Vec<EventRecord> {
        self.rx.try_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
