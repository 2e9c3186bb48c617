//! Server configuration
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `SOCKETSHELL_*` environment variables. Command-line flags are applied on
//! top by the binary.

use crate::error::Result;
use crate::session::Prompts;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// Prefix of environment variables overriding configuration
pub const ENV_PREFIX: &str = "SOCKETSHELL";

/// How evaluation namespaces are assigned to sessions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NamespaceMode {
    /// Every session starts from an empty namespace of its own
    #[default]
    Isolated,
    /// All sessions read and write one namespace for the server's lifetime
    Shared,
}

/// Startup configuration for the shell server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// Port to bind; `0` picks an ephemeral port
    pub port: u16,
    /// Copy session traffic and lifecycle notices to the audit sink
    pub audit_logging: bool,
    /// Run the accept loop detached from the main task
    pub daemon: bool,
    pub namespace: NamespaceMode,
    /// Primary prompt
    pub ps1: String,
    /// Continuation prompt
    pub ps2: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let prompts = Prompts::default();
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            audit_logging: true,
            daemon: false,
            namespace: NamespaceMode::Isolated,
            ps1: prompts.primary,
            ps2: prompts.continuation,
        }
    }
}

impl ServerConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_from(path, ENV_PREFIX)
    }

    /// Same as [`ServerConfig::load`] with a custom environment prefix
    pub fn load_from(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!("Loading configuration from {}", path.display());
            builder = builder.add_source(File::from(path));
        }
        let settings = builder
            .add_source(Environment::with_prefix(env_prefix).try_parsing(true))
            .build()?;

        Ok(settings.try_deserialize::<ServerConfig>()?)
    }

    /// `host:port` string handed to the listener
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn prompts(&self) -> Prompts {
        Prompts {
            primary: self.ps1.clone(),
            continuation: self.ps2.clone(),
        }
    }
}
