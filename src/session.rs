//! The event consumer: periodic queue draining, the visible log, and export.
//!
//! Runs on the single consumer thread. Each tick drains the funnel
//! exhaustively (not one record at a time) so the queue cannot grow while
//! the consumer is otherwise busy, then absorbs every record in arrival
//! order: a formatted log line, a copy in the in-memory export buffer, and
//! a copy in the plot buffers. Workers never touch any of these.

use crate::event::{EventKind, EventRecord};
use crate::funnel::EventDrain;
use crate::plot::PlotBuffers;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Severity of a visible log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Event,
    Warn,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Event => "EVENT",
            LogLevel::Warn => "WARN",
        }
    }
}

/// One line of the visible log / export buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub text: String,
}

impl LogEntry {
    /// The display form: `[2024-01-01 12:00:00] [EVENT] ...`
    pub fn line(&self) -> String {
        format!(
            "[{}] [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.level.as_str(),
            self.text
        )
    }
}

/// Consumer-side session state: drain, log, export buffer, plots.
pub struct MonitorSession {
    drain: EventDrain,
    entries: Vec<LogEntry>,
    plots: PlotBuffers,
    echo: bool,
}

impl MonitorSession {
    pub fn new(drain: EventDrain) -> Self {
        Self {
            drain,
            entries: Vec::new(),
            plots: PlotBuffers::new(),
            echo: false,
        }
    }

    /// Like [`MonitorSession::new`], but also prints each line as it lands.
    pub fn with_echo(drain: EventDrain) -> Self {
        let mut session = Self::new(drain);
        session.echo = true;
        session
    }

    /// One consumer tick: drain the funnel completely. Returns how many
    /// records were absorbed.
    pub fn poll(&mut self) -> usize {
        let records = self.drain.drain();
        let count = records.len();
        for record in records {
            self.absorb(record);
        }
        count
    }

    fn absorb(&mut self, record: EventRecord) {
        self.plots.record(&record);
        let level = match record.kind() {
            EventKind::Status => LogLevel::Warn,
            _ => LogLevel::Event,
        };
        let text = format!("[{}] {}", record.kind().as_str(), record.payload.summary());
        self.push_entry(LogEntry {
            timestamp: record.timestamp,
            level,
            text,
        });
    }

    /// Append a session milestone ("HID worker started", ...) to the log.
    pub fn note(&mut self, text: impl Into<String>) {
        self.push_entry(LogEntry {
            timestamp: Utc::now(),
            level: LogLevel::Info,
            text: text.into(),
        });
    }

    fn push_entry(&mut self, entry: LogEntry) {
        if self.echo {
            println!("{}", entry.line());
        }
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn plots(&self) -> &PlotBuffers {
        &self.plots
    }

    /// Export the buffer as CSV with a `timestamp,level,text` header.
    pub fn export_csv(&self, path: &Path) -> std::io::Result<()> {
        let mut out = String::from("timestamp,level,text\n");
        for entry in &self.entries {
            out.push_str(&format!(
                "{},{},{}\n",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
                entry.level.as_str(),
                csv_field(&entry.text)
            ));
        }
        std::fs::write(path, out)
    }

    /// Dump the visible log as plain text, one line per entry.
    pub fn save_log(&self, path: &Path) -> std::io::Result<()> {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.line());
            out.push('\n');
        }
        std::fs::write(path, out)
    }
}

/// Quote a CSV field when it contains a delimiter, quote, or line break.
fn csv_field(text: &str) -> String {
    if text.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventPayload;
    use crate::funnel::funnel;

    #[test]
    fn test_poll_drains_exhaustively_in_order() {
        let (sink, drain) = funnel();
        let mut session = MonitorSession::new(drain);

        for text in ["one", "two", "three"] {
            sink.push(EventRecord::new(EventPayload::Serial { text: text.into() }));
        }

        assert_eq!(session.poll(), 3);
        assert_eq!(session.poll(), 0);

        let texts: Vec<&str> = session
            .entries()
            .iter()
            .map(|e| e.text.as_str())
            .collect();
        assert_eq!(
            texts,
            vec!["[SERIAL] one", "[SERIAL] two", "[SERIAL] three"]
        );
        assert!(session
            .entries()
            .iter()
            .all(|e| e.level == LogLevel::Event));
    }

    #[test]
    fn test_status_records_log_as_warnings() {
        use crate::event::{Family, StopReason};

        let (sink, drain) = funnel();
        let mut session = MonitorSession::new(drain);

        sink.push(EventRecord::new(EventPayload::WorkerStopped {
            family: Family::Serial,
            reason: StopReason::ReadFailed,
        }));
        session.poll();

        let entry = &session.entries()[0];
        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.text, "[STATUS] SERIAL worker stopped: read failed");
    }

    #[test]
    fn test_csv_field_quoting() {
        assert_eq!(csv_field("plain"), "plain");
        assert_eq!(csv_field("a,b"), "\"a,b\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_field("two\nlines"), "\"two\nlines\"");
    }

    #[test]
    fn test_csv_export_shape() {
        let (sink, drain) = funnel();
        let mut session = MonitorSession::new(drain);
        session.note("worker started");
        sink.push(EventRecord::new(EventPayload::Serial {
            text: "v=1,unit=mm".into(),
        }));
        session.poll();

        let path = std::env::temp_dir().join(format!(
            "devmon-csv-test-{}.csv",
            std::process::id()
        ));
        session.export_csv(&path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("timestamp,level,text"));
        assert!(lines.next().unwrap().contains("INFO,worker started"));
        assert!(lines
            .next()
            .unwrap()
            .contains("EVENT,\"[SERIAL] v=1,unit=mm\""));
    }
}
