//! Line-oriented session streams
//!
//! A session talks to its client through two capabilities: a [`SessionInput`]
//! yielding newline-terminated lines and a [`SessionOutput`] accepting bytes.
//! Raw socket halves implement both through [`LineReader`] and
//! [`StreamWriter`]; [`crate::tee::TeeStream`] implements them again on top
//! of any other implementation.

use crate::audit::AuditSink;
use crate::tee::{directional_formatter, Direction, TeeStream};
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Source of client input lines
#[async_trait]
pub trait SessionInput: Send {
    /// Next raw line including its terminator, `None` once the stream is exhausted
    async fn next_line(&mut self) -> io::Result<Option<String>>;
}

/// Destination of session output
#[async_trait]
pub trait SessionOutput: Send {
    /// Write `data`, returning the number of bytes accepted
    async fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    /// Push buffered bytes to the peer
    async fn flush(&mut self) -> io::Result<()>;

    /// Shut down the write side. Closing twice is a no-op.
    async fn close(&mut self) -> io::Result<()>;
}

#[async_trait]
impl<T: SessionInput + ?Sized> SessionInput for Box<T> {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        (**self).next_line().await
    }
}

#[async_trait]
impl<T: SessionOutput + ?Sized> SessionOutput for Box<T> {
    async fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        (**self).write(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        (**self).flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        (**self).close().await
    }
}

/// Buffered line reader over any async byte source
pub struct LineReader<R> {
    inner: BufReader<R>,
}

impl<R: AsyncRead + Unpin + Send> LineReader<R> {
    /// Wrap a reader
    pub fn new(reader: R) -> Self {
        Self {
            inner: BufReader::new(reader),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> SessionInput for LineReader<R> {
    async fn next_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = Vec::new();
        let n = self.inner.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }
}

/// Writer over any async byte sink, remembering whether it was closed
pub struct StreamWriter<W> {
    inner: W,
    closed: bool,
}

impl<W: AsyncWrite + Unpin + Send> StreamWriter<W> {
    /// Wrap a writer
    pub fn new(writer: W) -> Self {
        Self {
            inner: writer,
            closed: false,
        }
    }

    /// Whether [`SessionOutput::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> SessionOutput for StreamWriter<W> {
    async fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "session output already closed",
            ));
        }
        self.inner.write_all(data).await?;
        Ok(data.len())
    }

    async fn flush(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.inner.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.inner.shutdown().await
    }
}

/// Strip one line terminator (`\n`, optionally preceded by `\r`)
pub fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// The input/output pair a session runs against
pub struct SessionIo {
    pub input: Box<dyn SessionInput>,
    pub output: Box<dyn SessionOutput>,
}

impl SessionIo {
    /// Use the connection's streams unmodified
    pub fn raw<I, O>(input: I, output: O) -> Self
    where
        I: SessionInput + 'static,
        O: SessionOutput + 'static,
    {
        Self {
            input: Box::new(input),
            output: Box::new(output),
        }
    }

    /// Tee both directions into `sink`, annotated with the client's address
    pub fn audited<I, O>(input: I, output: O, sink: Arc<dyn AuditSink>, client: SocketAddr) -> Self
    where
        I: SessionInput + 'static,
        O: SessionOutput + 'static,
    {
        Self {
            input: Box::new(
                TeeStream::new(input, Arc::clone(&sink))
                    .with_format(directional_formatter(client, Direction::Inbound)),
            ),
            output: Box::new(
                TeeStream::new(output, sink)
                    .with_format(directional_formatter(client, Direction::Outbound)),
            ),
        }
    }

    /// Pick raw or audited streams depending on whether audit logging is on
    pub fn resolve<I, O>(
        input: I,
        output: O,
        audit: Option<Arc<dyn AuditSink>>,
        client: SocketAddr,
    ) -> Self
    where
        I: SessionInput + 'static,
        O: SessionOutput + 'static,
    {
        match audit {
            Some(sink) => Self::audited(input, output, sink, client),
            None => Self::raw(input, output),
        }
    }
}
