//! Transparent traffic duplication
//!
//! [`TeeStream`] wraps a session stream and copies everything that passes
//! through it to an [`AuditSink`]. The caller sees exactly what the wrapped
//! stream produces: the same lines, the same byte counts, the same
//! end-of-stream. Only `write` and `next_line` are intercepted; `flush` and
//! `close` go straight to the inner stream.

use crate::audit::AuditSink;
use crate::stream::{SessionInput, SessionOutput};
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

/// Turns a chunk of traffic into the text recorded by the observer
pub type LineFormatter = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Formatter recording traffic unchanged
pub fn identity_formatter() -> LineFormatter {
    Arc::new(|line: &str| line.to_string())
}

/// Direction of traffic relative to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Client to server
    Inbound,
    /// Server to client
    Outbound,
}

impl Direction {
    /// Marker used in audit records
    pub fn marker(&self) -> char {
        match self {
            Self::Inbound => '<',
            Self::Outbound => '>',
        }
    }
}

/// Formatter producing `-- <client> <marker> <line>` records
///
/// A chunk may carry several lines (a traceback, multi-line `print` output).
/// Each non-empty line gets its own prefix with trailing whitespace dropped.
/// A chunk with no visible text still yields one bare record.
pub fn directional_formatter(client: SocketAddr, direction: Direction) -> LineFormatter {
    let marker = direction.marker();
    Arc::new(move |chunk: &str| {
        let mut record = String::new();
        for line in chunk.lines().map(str::trim_end).filter(|l| !l.is_empty()) {
            record.push_str(&format!("-- {} {} {}\n", client, marker, line));
        }
        if record.is_empty() {
            record = format!("-- {} {} \n", client, marker);
        }
        record
    })
}

/// Stream wrapper copying traffic to an observer
pub struct TeeStream<S> {
    inner: S,
    observer: Arc<dyn AuditSink>,
    format: LineFormatter,
}

impl<S> TeeStream<S> {
    /// Wrap `inner`, recording traffic unchanged into `observer`
    pub fn new(inner: S, observer: Arc<dyn AuditSink>) -> Self {
        Self {
            inner,
            observer,
            format: identity_formatter(),
        }
    }

    /// Replace the formatter
    pub fn with_format(mut self, format: LineFormatter) -> Self {
        self.format = format;
        self
    }

    /// Borrow the wrapped stream
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Unwrap, returning the inner stream
    pub fn into_inner(self) -> S {
        self.inner
    }

    fn observe(&self, text: &str) {
        let record = (self.format)(text);
        if let Err(e) = self.observer.record(&record) {
            warn!(error = %e, "failed to write audit record");
        }
    }
}

#[async_trait]
impl<S: SessionInput> SessionInput for TeeStream<S> {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        let line = self.inner.next_line().await?;
        if let Some(line) = &line {
            self.observe(line);
        }
        Ok(line)
    }
}

#[async_trait]
impl<S: SessionOutput> SessionOutput for TeeStream<S> {
    async fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        // Observer first: the audit trail must never lag the live transfer
        self.observe(&String::from_utf8_lossy(data));
        self.inner.write(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.inner.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.inner.close().await
    }
}
