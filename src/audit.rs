//! Audit sinks receiving formatted copies of session traffic
//!
//! When audit logging is enabled every line a client sends or receives is
//! recorded here, together with connect/close/disconnect notices. The sink is
//! injectable so embedders can route records to a file or keep them in memory.

use std::io::Write;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

/// Destination for audit records
///
/// Each call carries one complete record, normally newline terminated.
/// Implementations must be callable from many sessions at once.
pub trait AuditSink: Send + Sync {
    /// Record one line
    fn record(&self, line: &str) -> std::io::Result<()>;
}

/// Connection lifecycle events written to the audit sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Connection accepted and session about to start
    Connected,
    /// Client closed its end of the connection
    Closed,
    /// Connection failed with a network error
    Disconnected,
    /// Evaluated code asked to leave the session
    Exited,
}

impl SessionEvent {
    /// Word used in the audit notice
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Closed => "closed",
            Self::Disconnected => "disconnected",
            Self::Exited => "exited",
        }
    }
}

/// Format a lifecycle notice, e.g. `-- client 127.0.0.1:50312 connected`
pub fn notice(client: SocketAddr, event: SessionEvent) -> String {
    format!("-- client {} {}\n", client, event.as_str())
}

/// Sink writing to the process's standard error
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl AuditSink for StderrSink {
    fn record(&self, line: &str) -> std::io::Result<()> {
        // Hold the lock for the whole record so lines from
        // concurrent sessions never interleave mid-line
        let mut stderr = std::io::stderr().lock();
        stderr.write_all(line.as_bytes())?;
        stderr.flush()
    }
}

/// Sink wrapping any writer, e.g. an append-mode log file
pub struct WriterSink<W> {
    inner: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self {
            inner: Mutex::new(writer),
        }
    }

    /// Unwrap the writer
    pub fn into_inner(self) -> W {
        self.inner.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> AuditSink for WriterSink<W> {
    fn record(&self, line: &str) -> std::io::Result<()> {
        let mut writer = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        writer.write_all(line.as_bytes())?;
        writer.flush()
    }
}

/// In-memory sink, used by tests and embedders that inspect traffic
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<String>>,
}

impl MemorySink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record so far, in arrival order
    pub fn records(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// All records concatenated
    pub fn contents(&self) -> String {
        self.records().concat()
    }
}

impl AuditSink for MemorySink {
    fn record(&self, line: &str) -> std::io::Result<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notice_format() {
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        assert_eq!(
            notice(addr, SessionEvent::Connected),
            "-- client 127.0.0.1:4000 connected\n"
        );
        assert_eq!(
            notice(addr, SessionEvent::Disconnected),
            "-- client 127.0.0.1:4000 disconnected\n"
        );
    }

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.record("one\n").unwrap();
        sink.record("two\n").unwrap();
        assert_eq!(sink.records(), vec!["one\n", "two\n"]);
        assert_eq!(sink.contents(), "one\ntwo\n");
    }

    #[test]
    fn test_writer_sink() {
        let sink = WriterSink::new(Vec::new());
        sink.record("-- hello\n").unwrap();
        assert_eq!(sink.into_inner(), b"-- hello\n");
    }
}
