//! TCP listener dispatching connections to concurrent sessions

use crate::config::ServerConfig;
use crate::error::{Result, ShellError};
use crate::handler::HandlerFactory;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Pause after a failed accept so a persistent error (e.g. out of file
/// descriptors) does not spin the loop
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Cloneable switch that stops a server's accept loop
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    token: CancellationToken,
    /// Claimed by exactly one `stop` call, however many clones race
    stopped: Arc<AtomicBool>,
}

impl Shutdown {
    /// Stop accepting connections
    ///
    /// Returns [`ShellError::AlreadyStopped`] if the server was stopped before.
    pub fn stop(&self) -> Result<()> {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Err(ShellError::AlreadyStopped);
        }
        self.token.cancel();
        Ok(())
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// Bound shell server, ready to accept connections
pub struct ShellServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    factory: HandlerFactory,
    shutdown: Shutdown,
}

impl ShellServer {
    /// Bind the configured address
    ///
    /// Fails with [`ShellError::Bind`] before anything is served when the
    /// address is unavailable.
    pub async fn bind(config: &ServerConfig, factory: HandlerFactory) -> Result<Self> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ShellError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = listener.local_addr()?;

        info!(
            "{} {} listening on {}",
            factory.identity().name,
            factory.identity().instance_id,
            local_addr
        );

        Ok(Self {
            listener,
            local_addr,
            factory,
            shutdown: Shutdown::default(),
        })
    }

    /// Address actually bound, including the port picked for port `0`
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Accept connections until stopped
    ///
    /// Each connection runs on its own task. Stopping closes the listener;
    /// sessions already running are left to finish on their own.
    pub async fn serve_forever(self) -> Result<()> {
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.token.cancelled() => {
                    info!("Shell server on {} stopped accepting connections", self.local_addr);
                    return Ok(());
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, client)) => {
                        debug!("Accepted connection from {}", client);
                        let handler = self.factory.build(client, self.local_addr);
                        tokio::spawn(async move {
                            match handler.handle_stream(stream).await {
                                Ok(outcome) => debug!("Session for {} finished: {:?}", client, outcome),
                                Err(e) => error!("Session worker for {} failed: {}", client, e),
                            }
                        });
                    }
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }
    }

    /// Run the accept loop on a background task
    pub fn spawn(self) -> ServerHandle {
        let local_addr = self.local_addr;
        let shutdown = self.shutdown_handle();
        let task = tokio::spawn(self.serve_forever());
        ServerHandle {
            local_addr,
            shutdown,
            task,
        }
    }
}

/// Handle to a server running in the background
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: Shutdown,
    task: JoinHandle<Result<()>>,
}

impl ServerHandle {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Stop accepting; see [`Shutdown::stop`]
    pub fn stop(&self) -> Result<()> {
        self.shutdown.stop()
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown.is_stopped()
    }

    /// Wait for the accept loop to finish
    pub async fn join(self) -> Result<()> {
        self.task
            .await
            .map_err(|e| ShellError::Other(format!("Server task failed: {}", e)))?
    }
}
