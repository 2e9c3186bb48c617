//! Error types for the SocketShell server
//!
//! This module provides error handling using thiserror for structured error
//! definitions and anyhow for error propagation at the binary boundary.

use std::net::SocketAddr;
use thiserror::Error;

/// Main error type for SocketShell operations
#[derive(Error, Debug)]
pub enum ShellError {
    /// Listener could not acquire the requested address
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Client input stream is exhausted
    #[error("End of input")]
    EndOfInput,

    /// I/O error on a connection or sink
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Listener was already stopped
    #[error("Server already stopped")]
    AlreadyStopped,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Evaluation worker died before producing a result
    #[error("Evaluation worker failed for {client}: {reason}")]
    Worker { client: SocketAddr, reason: String },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl ShellError {
    /// Whether this error means the peer went away mid-session
    pub fn is_disconnect(&self) -> bool {
        matches!(self, ShellError::Io(_))
    }
}

/// Result type alias for SocketShell operations
pub type Result<T> = std::result::Result<T, ShellError>;

/// Convert anyhow::Error to ShellError
impl From<anyhow::Error> for ShellError {
    fn from(err: anyhow::Error) -> Self {
        ShellError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ShellError::AlreadyStopped;
        assert_eq!(err.to_string(), "Server already stopped");

        let err = ShellError::Bind {
            addr: "127.0.0.1:80".to_string(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().starts_with("Failed to bind 127.0.0.1:80"));
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
        let shell_err: ShellError = io_err.into();
        assert!(shell_err.is_disconnect());
        assert!(!ShellError::EndOfInput.is_disconnect());
    }
}
