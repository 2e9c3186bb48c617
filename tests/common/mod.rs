//! Common test utilities and helpers

use socketshell_core::{
    HandlerFactory, MemorySink, MiniPython, NamespaceMode, ServerConfig, ServerHandle, ShellServer,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

pub const PROMPT: &str = ">>> ";
pub const CONTINUATION: &str = "... ";

const IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Server running in the background with an in-memory audit sink
pub struct TestServer {
    pub handle: ServerHandle,
    pub sink: Arc<MemorySink>,
}

impl TestServer {
    pub fn addr(&self) -> SocketAddr {
        self.handle.local_addr()
    }

    /// Wait until the audit sink holds `record`
    pub async fn wait_for_record(&self, record: &str) {
        let sink = Arc::clone(&self.sink);
        tokio::time::timeout(IO_TIMEOUT, async move {
            while !sink.records().iter().any(|r| r == record) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("audit record {:?} never arrived", record));
    }
}

/// Start a server on an ephemeral loopback port
pub async fn start_server(namespace: NamespaceMode, audit_logging: bool) -> TestServer {
    let config = ServerConfig {
        namespace,
        audit_logging,
        ..ServerConfig::default()
    };
    let sink = Arc::new(MemorySink::new());
    let factory = HandlerFactory::new(&config, Arc::new(MiniPython::new())).with_sink(sink.clone());
    let server = ShellServer::bind(&config, factory)
        .await
        .expect("Failed to bind test server");

    TestServer {
        handle: server.spawn(),
        sink,
    }
}

/// Line-oriented TCP client speaking to a test server
pub struct Client {
    stream: TcpStream,
    pending: String,
}

impl Client {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("Failed to connect");
        Self {
            stream,
            pending: String::new(),
        }
    }

    /// Address the server sees for this client
    pub fn addr(&self) -> SocketAddr {
        self.stream.local_addr().expect("Client has no local address")
    }

    pub async fn send(&mut self, line: &str) {
        self.stream
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .expect("Failed to send line");
    }

    /// Read until the server waits at a prompt; returns everything up to and including it
    pub async fn read_reply(&mut self) -> String {
        let stream = &mut self.stream;
        let pending = &mut self.pending;
        tokio::time::timeout(IO_TIMEOUT, async {
            while !pending.ends_with(PROMPT) && !pending.ends_with(CONTINUATION) {
                let mut buf = [0u8; 1024];
                let n = stream.read(&mut buf).await.expect("Failed to read reply");
                if n == 0 {
                    break;
                }
                pending.push_str(&String::from_utf8_lossy(&buf[..n]));
            }
        })
        .await
        .expect("Timed out waiting for a prompt");
        std::mem::take(&mut self.pending)
    }

    /// Send `line` and return the server's reply
    pub async fn exchange(&mut self, line: &str) -> String {
        self.send(line).await;
        self.read_reply().await
    }

    /// Read until the server closes the connection
    pub async fn read_to_end(&mut self) -> String {
        let mut rest = Vec::new();
        tokio::time::timeout(IO_TIMEOUT, self.stream.read_to_end(&mut rest))
            .await
            .expect("Timed out waiting for the server to close")
            .expect("Failed to read until close");
        let mut out = std::mem::take(&mut self.pending);
        out.push_str(&String::from_utf8_lossy(&rest));
        out
    }

    /// Half-close: the server sees end of input
    pub async fn shutdown(&mut self) {
        self.stream.shutdown().await.expect("Failed to shut down");
    }
}
