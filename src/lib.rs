//! SocketShell - live, multi-user interactive shell served over TCP
//!
//! Every accepted connection gets its own read-prompt-eval-print session.
//! When audit logging is on, all traffic is duplicated to a diagnostic sink
//! with the client's address attached.
//!
//! # Architecture
//!
//! - **Listener** ([`server`]): binds, accepts, spawns one task per connection
//! - **ConnectionHandler** ([`handler`]): picks raw or audited streams, runs the
//!   session and classifies how it ended
//! - **InteractiveSession** ([`session`]): prompt, read, evaluate, print
//! - **TeeStream** ([`tee`]): transparent traffic duplication
//! - **Evaluator** ([`evaluator`]): executes source against a namespace
//!
//! # Example
//!
//! ```ignore
//! use socketshell_core::{HandlerFactory, MiniPython, ServerConfig, ShellServer};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> socketshell_core::Result<()> {
//!     let config = ServerConfig::load(None)?;
//!     let factory = HandlerFactory::new(&config, Arc::new(MiniPython::new()));
//!     let server = ShellServer::bind(&config, factory).await?;
//!     println!("connect to {}", server.local_addr());
//!     server.serve_forever().await
//! }
//! ```

pub mod audit;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod handler;
pub mod server;
pub mod session;
pub mod stream;
pub mod tee;

pub use audit::{AuditSink, MemorySink, SessionEvent, StderrSink, WriterSink};
pub use config::{NamespaceMode, ServerConfig};
pub use error::{Result, ShellError};
pub use evaluator::{Evaluation, Evaluator, MiniPython, Namespace, SharedNamespace, Value};
pub use handler::{ConnectionHandler, HandlerFactory, ServerIdentity, SessionOutcome};
pub use server::{ServerHandle, ShellServer, Shutdown};
pub use session::{InteractiveSession, Prompts, Step};
pub use stream::{LineReader, SessionInput, SessionIo, SessionOutput, StreamWriter};
pub use tee::{Direction, LineFormatter, TeeStream};
