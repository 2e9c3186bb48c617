//! Per-connection entry point
//!
//! The listener owns one [`HandlerFactory`], configured once at startup. For
//! every accepted connection it builds a [`ConnectionHandler`], which picks
//! raw or audited streams, runs an [`InteractiveSession`] and classifies how
//! the session ended.

use crate::audit::{notice, AuditSink, SessionEvent, StderrSink};
use crate::config::{NamespaceMode, ServerConfig};
use crate::error::{Result, ShellError};
use crate::evaluator::{Evaluator, Namespace, SharedNamespace};
use crate::session::{InteractiveSession, Prompts};
use crate::stream::{LineReader, SessionIo, StreamWriter};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Name reported in session banners
pub const SERVER_NAME: &str = "ShellServer";

/// Identity of a running server, shown to every client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    pub name: String,
    pub instance_id: String,
}

impl ServerIdentity {
    /// Fresh identity with a short random instance id
    pub fn generate() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            instance_id: uuid::Uuid::new_v4().to_string()[..8].to_string(),
        }
    }
}

/// Where each session's namespace comes from
#[derive(Clone)]
pub enum NamespaceScope {
    /// New empty namespace per session
    Isolated,
    /// One namespace for every session
    Shared(SharedNamespace),
}

impl NamespaceScope {
    fn from_mode(mode: NamespaceMode) -> Self {
        match mode {
            NamespaceMode::Isolated => Self::Isolated,
            NamespaceMode::Shared => Self::Shared(Arc::new(Mutex::new(Namespace::new()))),
        }
    }

    fn for_session(&self) -> SharedNamespace {
        match self {
            Self::Isolated => Arc::new(Mutex::new(Namespace::new())),
            Self::Shared(namespace) => Arc::clone(namespace),
        }
    }
}

/// How a session ended without a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Client closed its end
    Closed,
    /// Network failure on the connection
    Disconnected,
    /// Evaluated code requested exit
    Exited { code: i32 },
}

impl SessionOutcome {
    fn event(&self) -> SessionEvent {
        match self {
            Self::Closed => SessionEvent::Closed,
            Self::Disconnected => SessionEvent::Disconnected,
            Self::Exited { .. } => SessionEvent::Exited,
        }
    }
}

/// Produces fully configured handlers for accepted connections
#[derive(Clone)]
pub struct HandlerFactory {
    audit_logging: bool,
    sink: Arc<dyn AuditSink>,
    evaluator: Arc<dyn Evaluator>,
    namespaces: NamespaceScope,
    prompts: Prompts,
    identity: ServerIdentity,
}

impl HandlerFactory {
    /// Factory auditing to standard error when `config` enables it
    pub fn new(config: &ServerConfig, evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            audit_logging: config.audit_logging,
            sink: Arc::new(StderrSink),
            evaluator,
            namespaces: NamespaceScope::from_mode(config.namespace),
            prompts: config.prompts(),
            identity: ServerIdentity::generate(),
        }
    }

    /// Send audit records to `sink` instead of standard error
    pub fn with_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    pub fn audit_logging(&self) -> bool {
        self.audit_logging
    }

    /// Handler for one connection from `client` accepted on `local`
    pub fn build(&self, client: SocketAddr, local: SocketAddr) -> ConnectionHandler {
        let banner = format!(
            "{}\n<<{} {} on {} serving {}>>",
            self.evaluator.version(),
            self.identity.name,
            self.identity.instance_id,
            local,
            client
        );
        ConnectionHandler {
            client,
            audit: self.audit_logging.then(|| Arc::clone(&self.sink)),
            evaluator: Arc::clone(&self.evaluator),
            namespace: self.namespaces.for_session(),
            prompts: self.prompts.clone(),
            banner,
        }
    }
}

/// Runs one session on one connection
pub struct ConnectionHandler {
    client: SocketAddr,
    audit: Option<Arc<dyn AuditSink>>,
    evaluator: Arc<dyn Evaluator>,
    namespace: SharedNamespace,
    prompts: Prompts,
    banner: String,
}

impl ConnectionHandler {
    pub fn banner(&self) -> &str {
        &self.banner
    }

    pub fn client(&self) -> SocketAddr {
        self.client
    }

    /// Serve a TCP connection
    pub async fn handle_stream(self, stream: TcpStream) -> Result<SessionOutcome> {
        let (reader, writer) = stream.into_split();
        self.handle(reader, writer).await
    }

    /// Serve a connection given as separate read and write halves
    ///
    /// End of input and network failures are reported as a [`SessionOutcome`].
    /// Any other error is returned to the caller.
    pub async fn handle<R, W>(self, reader: R, writer: W) -> Result<SessionOutcome>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        self.notify(SessionEvent::Connected);

        let io = SessionIo::resolve(
            LineReader::new(reader),
            StreamWriter::new(writer),
            self.audit.clone(),
            self.client,
        );
        let mut session = InteractiveSession::new(
            io,
            Arc::clone(&self.evaluator),
            Arc::clone(&self.namespace),
            self.prompts.clone(),
            self.client,
        );

        let outcome = match session.interact(&self.banner).await {
            Ok(code) => SessionOutcome::Exited { code },
            Err(ShellError::EndOfInput) => SessionOutcome::Closed,
            Err(e) if e.is_disconnect() => {
                debug!("Connection to {} failed: {}", self.client, e);
                SessionOutcome::Disconnected
            }
            Err(e) => return Err(e),
        };

        if outcome != SessionOutcome::Disconnected {
            if let Err(e) = session.close().await {
                debug!("Failed to close connection to {}: {}", self.client, e);
            }
        }

        self.notify(outcome.event());
        info!(client = %self.client, outcome = ?outcome, "Session ended");
        Ok(outcome)
    }

    fn notify(&self, event: SessionEvent) {
        if let Some(sink) = &self.audit {
            if let Err(e) = sink.record(&notice(self.client, event)) {
                warn!("Failed to write audit notice: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemorySink;
    use crate::evaluator::{Evaluation, MiniPython};
    use std::io::Write;
    use tokio::io::AsyncReadExt;

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn factory(config: &ServerConfig, sink: Arc<MemorySink>) -> HandlerFactory {
        HandlerFactory::new(config, Arc::new(MiniPython::new())).with_sink(sink)
    }

    /// Run `input` through a handler, returning the outcome and what the client saw
    async fn run(handler: ConnectionHandler, input: &'static [u8]) -> (Result<SessionOutcome>, String) {
        let (mut client_out, server_out) = tokio::io::duplex(16 * 1024);
        let outcome = handler.handle(input, server_out).await;
        let mut seen = String::new();
        client_out.read_to_string(&mut seen).await.unwrap();
        (outcome, seen)
    }

    #[test]
    fn test_banner_names_server_and_peers() {
        let factory = factory(&ServerConfig::default(), Arc::new(MemorySink::new()));
        let handler = factory.build(addr("10.1.1.1:5000"), addr("127.0.0.1:2323"));
        let id = &factory.identity().instance_id;

        assert_eq!(id.len(), 8);
        assert!(handler.banner().starts_with("SocketShell mini-python"));
        assert!(handler.banner().ends_with(&format!(
            "\n<<ShellServer {} on 127.0.0.1:2323 serving 10.1.1.1:5000>>",
            id
        )));
    }

    #[tokio::test]
    async fn test_closed_session_is_audited() {
        let sink = Arc::new(MemorySink::new());
        let factory = factory(&ServerConfig::default(), sink.clone());
        let handler = factory.build(addr("10.1.1.1:5000"), addr("127.0.0.1:2323"));

        let (outcome, seen) = run(handler, b"1+1\n").await;
        assert_eq!(outcome.unwrap(), SessionOutcome::Closed);
        assert!(seen.ends_with(">>> 2\n>>> "));

        let records = sink.records();
        assert_eq!(records.first().unwrap(), "-- client 10.1.1.1:5000 connected\n");
        assert!(records.contains(&"-- 10.1.1.1:5000 < 1+1\n".to_string()));
        assert!(records.contains(&"-- 10.1.1.1:5000 > 2\n".to_string()));
        assert_eq!(records.last().unwrap(), "-- client 10.1.1.1:5000 closed\n");
    }

    #[tokio::test]
    async fn test_logging_disabled_uses_raw_streams() {
        let sink = Arc::new(MemorySink::new());
        let config = ServerConfig {
            audit_logging: false,
            ..ServerConfig::default()
        };
        let handler = factory(&config, sink.clone()).build(addr("10.1.1.1:5000"), addr("127.0.0.1:1"));

        let (outcome, seen) = run(handler, b"'quiet'\n").await;
        assert_eq!(outcome.unwrap(), SessionOutcome::Closed);
        assert!(seen.contains("'quiet'\n"));
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_exit_is_reported() {
        let sink = Arc::new(MemorySink::new());
        let handler = factory(&ServerConfig::default(), sink.clone())
            .build(addr("10.1.1.1:5000"), addr("127.0.0.1:1"));

        let (outcome, _) = run(handler, b"quit(5)\n").await;
        assert_eq!(outcome.unwrap(), SessionOutcome::Exited { code: 5 });
        assert_eq!(sink.records().last().unwrap(), "-- client 10.1.1.1:5000 exited\n");
    }

    #[tokio::test]
    async fn test_write_failure_is_disconnect() {
        let sink = Arc::new(MemorySink::new());
        let handler = factory(&ServerConfig::default(), sink.clone())
            .build(addr("10.1.1.1:5000"), addr("127.0.0.1:1"));

        let (client_end, server_end) = tokio::io::duplex(64);
        drop(client_end);
        let outcome = handler.handle(&b"1+1\n"[..], server_end).await.unwrap();
        assert_eq!(outcome, SessionOutcome::Disconnected);
        assert_eq!(sink.records().last().unwrap(), "-- client 10.1.1.1:5000 disconnected\n");
    }

    struct Panicking;

    impl Evaluator for Panicking {
        fn version(&self) -> String {
            "panicking".to_string()
        }

        fn evaluate(&self, _: &str, _: &mut Namespace, _: &mut dyn Write) -> Evaluation {
            panic!("evaluator bug")
        }
    }

    #[tokio::test]
    async fn test_unexpected_failure_propagates() {
        let handler = HandlerFactory::new(&ServerConfig::default(), Arc::new(Panicking))
            .with_sink(Arc::new(MemorySink::new()))
            .build(addr("10.1.1.1:5000"), addr("127.0.0.1:1"));

        let (_client, server_end) = tokio::io::duplex(1024);
        let err = handler.handle(&b"boom\n"[..], server_end).await.unwrap_err();
        assert!(matches!(err, ShellError::Worker { .. }));
    }

    #[test]
    fn test_shared_scope_hands_out_one_namespace() {
        let config = ServerConfig {
            namespace: NamespaceMode::Shared,
            audit_logging: false,
            ..ServerConfig::default()
        };
        let factory = factory(&config, Arc::new(MemorySink::new()));
        let first = factory.build(addr("10.0.0.1:1"), addr("127.0.0.1:1"));
        let second = factory.build(addr("10.0.0.2:1"), addr("127.0.0.1:1"));
        assert!(Arc::ptr_eq(&first.namespace, &second.namespace));

        let isolated = HandlerFactory::new(&ServerConfig::default(), Arc::new(MiniPython::new()));
        let a = isolated.build(addr("10.0.0.1:1"), addr("127.0.0.1:1"));
        let b = isolated.build(addr("10.0.0.2:1"), addr("127.0.0.1:1"));
        assert!(!Arc::ptr_eq(&a.namespace, &b.namespace));
    }
}
