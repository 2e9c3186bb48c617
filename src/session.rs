//! Interactive read-prompt-eval-print loop for one connection
//!
//! An [`InteractiveSession`] owns the session's streams, accumulates input
//! lines until the evaluator reports a complete statement, and writes the
//! captured output or traceback back to the same connection. Evaluation runs
//! on the blocking pool so a long computation stalls only its own session.

use crate::error::{Result, ShellError};
use crate::evaluator::{Evaluation, Evaluator, SharedNamespace};
use crate::stream::{strip_line_ending, SessionInput, SessionIo, SessionOutput};
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError};
use tracing::debug;

/// Prompt strings shown to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompts {
    /// Shown when a new statement may start
    pub primary: String,
    /// Shown while a statement is still incomplete
    pub continuation: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            primary: ">>> ".to_string(),
            continuation: "... ".to_string(),
        }
    }
}

/// Result of pushing one line into the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Statement incomplete, continuation prompt next
    More,
    /// Statement evaluated, primary prompt next
    Ready,
    /// Evaluated code asked to end the session
    Exit(i32),
}

/// REPL state for a single client
pub struct InteractiveSession {
    input: Box<dyn SessionInput>,
    output: Box<dyn SessionOutput>,
    evaluator: Arc<dyn Evaluator>,
    namespace: SharedNamespace,
    prompts: Prompts,
    buffer: Vec<String>,
    client: SocketAddr,
}

impl InteractiveSession {
    pub fn new(
        io: SessionIo,
        evaluator: Arc<dyn Evaluator>,
        namespace: SharedNamespace,
        prompts: Prompts,
        client: SocketAddr,
    ) -> Self {
        Self {
            input: io.input,
            output: io.output,
            evaluator,
            namespace,
            prompts,
            buffer: Vec::new(),
            client,
        }
    }

    /// Address of the connected client
    pub fn client(&self) -> SocketAddr {
        self.client
    }

    /// Whether a statement is waiting for more lines
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Write `text` and flush it to the peer
    pub async fn prompt(&mut self, text: &str) -> Result<()> {
        self.output.write(text.as_bytes()).await?;
        self.output.flush().await?;
        Ok(())
    }

    /// Next input line without its terminator
    ///
    /// Returns [`ShellError::EndOfInput`] once the client has closed its side.
    pub async fn read_line(&mut self) -> Result<String> {
        match self.input.next_line().await? {
            Some(line) => Ok(strip_line_ending(&line).to_string()),
            None => Err(ShellError::EndOfInput),
        }
    }

    /// Add `line` to the pending statement and evaluate what has accumulated
    pub async fn push(&mut self, line: String) -> Result<Step> {
        self.buffer.push(line);
        let source = self.buffer.join("\n");

        let evaluator = Arc::clone(&self.evaluator);
        let namespace = Arc::clone(&self.namespace);
        let (evaluation, captured) = tokio::task::spawn_blocking(move || {
            let mut captured = Vec::new();
            // A panicking evaluation must not lock everyone else out of a shared namespace
            let mut namespace = namespace.lock().unwrap_or_else(PoisonError::into_inner);
            let evaluation = evaluator.evaluate(&source, &mut namespace, &mut captured);
            (evaluation, captured)
        })
        .await
        .map_err(|e| ShellError::Worker {
            client: self.client,
            reason: e.to_string(),
        })?;

        if evaluation != Evaluation::Incomplete {
            self.buffer.clear();
        }
        if !captured.is_empty() {
            self.output.write(&captured).await?;
        }

        match evaluation {
            Evaluation::Incomplete => Ok(Step::More),
            Evaluation::Complete => Ok(Step::Ready),
            Evaluation::Failed { traceback } => {
                self.output.write(traceback.as_bytes()).await?;
                Ok(Step::Ready)
            }
            Evaluation::ExitRequested { code } => {
                debug!("Client {} requested exit with code {}", self.client, code);
                Ok(Step::Exit(code))
            }
        }
    }

    /// Write `banner`, then loop until the client leaves
    ///
    /// Returns the exit code when evaluated code ends the session. End of
    /// input and I/O failures come back as errors for the caller to classify.
    pub async fn interact(&mut self, banner: &str) -> Result<i32> {
        self.output.write(format!("{}\n", banner).as_bytes()).await?;

        let mut step = Step::Ready;
        loop {
            let prompt = match step {
                Step::More => self.prompts.continuation.clone(),
                _ => self.prompts.primary.clone(),
            };
            self.prompt(&prompt).await?;

            let line = self.read_line().await?;
            step = self.push(line).await?;
            if let Step::Exit(code) = step {
                return Ok(code);
            }
        }
    }

    /// Close the output side. Closing twice is harmless.
    pub async fn close(&mut self) -> Result<()> {
        self.output.close().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::{MiniPython, Namespace, Value};
    use crate::stream::{LineReader, StreamWriter};
    use std::sync::Mutex;
    use tokio::io::{AsyncReadExt, DuplexStream};

    fn client() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    fn session(input: &'static [u8], namespace: SharedNamespace) -> (InteractiveSession, DuplexStream) {
        let (peer, server_end) = tokio::io::duplex(16 * 1024);
        let io = SessionIo::raw(LineReader::new(input), StreamWriter::new(server_end));
        let session = InteractiveSession::new(
            io,
            Arc::new(MiniPython::new()),
            namespace,
            Prompts::default(),
            client(),
        );
        (session, peer)
    }

    fn fresh() -> SharedNamespace {
        Arc::new(Mutex::new(Namespace::new()))
    }

    async fn transcript(mut session: InteractiveSession, mut peer: DuplexStream) -> String {
        session.close().await.unwrap();
        let mut out = String::new();
        peer.read_to_string(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_interact_until_end_of_input() {
        let (mut session, peer) = session(b"1+1\nx = 5\nx * 2\r\n", fresh());
        let err = session.interact("hello").await.unwrap_err();
        assert!(matches!(err, ShellError::EndOfInput));
        assert_eq!(
            transcript(session, peer).await,
            "hello\n>>> 2\n>>> >>> 10\n>>> "
        );
    }

    #[tokio::test]
    async fn test_continuation_prompts() {
        let (mut session, peer) = session(b"def f():\n    return 1\n\nf()\n", fresh());
        assert!(session.interact("b").await.is_err());
        assert_eq!(
            transcript(session, peer).await,
            "b\n>>> ... ... >>> 1\n>>> "
        );
    }

    #[tokio::test]
    async fn test_traceback_keeps_session_alive() {
        let (mut session, peer) = session(b"raise ValueError('x')\n'still here'\n", fresh());
        assert!(session.interact("b").await.is_err());
        let out = transcript(session, peer).await;
        assert!(out.contains("ValueError: x\n>>> 'still here'\n>>> "));
    }

    #[tokio::test]
    async fn test_exit_ends_loop() {
        let (mut session, peer) = session(b"print('bye')\nexit(2)\n1+1\n", fresh());
        assert_eq!(session.interact("b").await.unwrap(), 2);
        assert_eq!(transcript(session, peer).await, "b\n>>> bye\n>>> ");
    }

    #[tokio::test]
    async fn test_push_keeps_buffer_until_complete() {
        let (mut session, _peer) = session(b"", fresh());
        assert_eq!(session.push("if True:".into()).await.unwrap(), Step::More);
        assert!(session.has_pending());
        assert_eq!(session.push("    y = 3".into()).await.unwrap(), Step::More);
        assert_eq!(session.push(String::new()).await.unwrap(), Step::Ready);
        assert!(!session.has_pending());
    }

    #[tokio::test]
    async fn test_sessions_sharing_a_namespace() {
        let shared = fresh();
        let (mut first, _a) = session(b"", Arc::clone(&shared));
        let (mut second, _b) = session(b"", Arc::clone(&shared));

        first.push("counter = 1".into()).await.unwrap();
        second.push("counter += 1".into()).await.unwrap();

        let ns = shared.lock().unwrap();
        assert_eq!(ns.get("counter"), Some(&Value::Int(2)));
    }

    #[tokio::test]
    async fn test_read_line_reports_end_of_input() {
        let (mut session, _peer) = session(b"only\n", fresh());
        assert_eq!(session.read_line().await.unwrap(), "only");
        assert!(matches!(session.read_line().await, Err(ShellError::EndOfInput)));
    }
}
