//! Serial (COM port) worker driver backed by the serialport crate.

use crate::directory::SerialDescriptor;
use crate::event::{EventPayload, EventRecord, Family};
use crate::funnel::EventSink;
use crate::worker::{DeviceDriver, PollOutcome, WorkerError};
use serialport::SerialPort;
use std::io::Read;
use std::time::Duration;

/// Read timeout per poll; bounds the stop-signal turnaround.
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Reads newline-terminated lines from one serial port.
///
/// Bytes are buffered across polls until a delimiter arrives; decoding is
/// lossy, so invalid encoding degrades to replacement characters instead of
/// failing the worker.
pub struct SerialDriver {
    descriptor: SerialDescriptor,
    baud_rate: u32,
    pending: Vec<u8>,
}

impl SerialDriver {
    pub fn new(descriptor: SerialDescriptor, baud_rate: u32) -> Self {
        Self {
            descriptor,
            baud_rate,
            pending: Vec::new(),
        }
    }

    /// Split off complete lines from the pending buffer and push them.
    fn flush_lines(&mut self, sink: &EventSink) -> bool {
        let mut pushed = false;
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line)
                .trim_end_matches(&['\r', '\n'][..])
                .to_string();
            sink.push(EventRecord::new(EventPayload::Serial { text }));
            pushed = true;
        }
        pushed
    }

    /// Push whatever sits after the last delimiter as a final event, so a
    /// device that never terminates its output still surfaces it at stop.
    fn flush_residue(&mut self, sink: &EventSink) {
        if self.pending.is_empty() {
            return;
        }
        let rest = std::mem::take(&mut self.pending);
        let text = String::from_utf8_lossy(&rest)
            .trim_end_matches('\r')
            .to_string();
        sink.push(EventRecord::new(EventPayload::Serial { text }));
    }
}

impl DeviceDriver for SerialDriver {
    type Handle = Box<dyn SerialPort>;

    fn family(&self) -> Family {
        Family::Serial
    }

    fn describe(&self) -> String {
        format!("{} @ {}", self.descriptor.port_name, self.baud_rate)
    }

    fn open(&mut self) -> Result<Box<dyn SerialPort>, WorkerError> {
        let port = serialport::new(self.descriptor.port_name.clone(), self.baud_rate)
            .timeout(READ_TIMEOUT)
            .open()?;
        Ok(port)
    }

    fn poll(
        &mut self,
        port: &mut Box<dyn SerialPort>,
        sink: &EventSink,
    ) -> Result<PollOutcome, WorkerError> {
        let mut chunk = [0u8; 256];
        match port.read(&mut chunk) {
            Ok(0) => Ok(PollOutcome::Idle),
            Ok(n) => {
                self.pending.extend_from_slice(&chunk[..n]);
                if self.flush_lines(sink) {
                    Ok(PollOutcome::Events)
                } else {
                    Ok(PollOutcome::Idle)
                }
            }
            // A timed-out read is an empty read, not a failure.
            Err(e)
                if e.kind() == std::io::ErrorKind::TimedOut
                    || e.kind() == std::io::ErrorKind::WouldBlock =>
            {
                Ok(PollOutcome::Idle)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self, handle: Box<dyn SerialPort>, sink: &EventSink) {
        drop(handle);
        self.flush_residue(sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::funnel::funnel;

    fn driver() -> SerialDriver {
        SerialDriver::new(
            SerialDescriptor {
                port_name: "/dev/ttyTEST".into(),
            },
            115200,
        )
    }

    #[test]
    fn test_line_assembly_across_chunks() {
        let (sink, drain) = funnel();
        let mut d = driver();

        d.pending.extend_from_slice(b"hel");
        assert!(!d.flush_lines(&sink));

        d.pending.extend_from_slice(b"lo\r\nwor");
        assert!(d.flush_lines(&sink));

        let records = drain.drain();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].payload,
            EventPayload::Serial {
                text: "hello".into()
            }
        );
        // The partial second line stays buffered.
        assert_eq!(d.pending, b"wor");
    }

    #[test]
    fn test_lossy_decode_never_fails() {
        let (sink, drain) = funnel();
        let mut d = driver();

        d.pending.extend_from_slice(&[0xff, 0xfe, b'!', b'\n']);
        assert!(d.flush_lines(&sink));

        let records = drain.drain();
        match &records[0].payload {
            EventPayload::Serial { text } => {
                assert!(text.ends_with('!'));
                assert!(text.contains('\u{fffd}'));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_residue_flushed_as_final_event() {
        let (sink, drain) = funnel();
        let mut d = driver();

        // A stream with no trailing delimiter: the complete line goes out
        // on flush, the tail only when the stream closes.
        d.pending.extend_from_slice(b"done\r\npartial\r");
        assert!(d.flush_lines(&sink));
        d.flush_residue(&sink);
        d.flush_residue(&sink);

        let texts: Vec<String> = drain
            .drain()
            .into_iter()
            .map(|r| match r.payload {
                EventPayload::Serial { text } => text,
                other => panic!("unexpected payload: {other:?}"),
            })
            .collect();
        assert_eq!(texts, vec!["done", "partial"]);
        assert!(d.pending.is_empty());
    }

    #[test]
    fn test_multiple_lines_in_one_chunk() {
        let (sink, drain) = funnel();
        let mut d = driver();

        d.pending.extend_from_slice(b"a\nb\nc\n");
        assert!(d.flush_lines(&sink));
        let texts: Vec<String> = drain
            .drain()
            .into_iter()
            .map(|r| match r.payload {
                EventPayload::Serial { text } => text,
                other => panic!("unexpected payload: {other:?}"),
            })
            .collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }
}
