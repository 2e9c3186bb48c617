//! SocketShell - serve interactive shell sessions over TCP
//!
//! Usage: `socketshell [OPTIONS] [PORT]`

use clap::{ArgAction, Parser};
use socketshell_core::{
    error::{Result, ShellError},
    HandlerFactory, MiniPython, NamespaceMode, ServerConfig, ShellServer,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::{self, EnvFilter};

#[derive(Parser)]
#[command(name = "socketshell")]
#[command(about = "Serve live interactive shell sessions over TCP", long_about = None)]
#[command(version)]
#[command(disable_help_flag = true)]
struct Cli {
    /// Port to listen on (same as --port)
    #[arg(value_name = "PORT")]
    port_arg: Option<u16>,

    /// Interface to bind
    #[arg(short = 'h', long)]
    host: Option<String>,

    /// Port to listen on; 0 picks a free port
    #[arg(short, long)]
    port: Option<u16>,

    /// Disable audit logging and the startup message
    #[arg(short, long)]
    quiet: bool,

    /// Run the accept loop in the background until interrupted
    #[arg(long)]
    daemon: bool,

    /// Let all sessions share one namespace
    #[arg(long)]
    shared_namespace: bool,

    /// Configuration file (TOML)
    #[arg(long, env = "SOCKETSHELL_CONFIG")]
    config: Option<PathBuf>,

    /// Set log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl Cli {
    /// Layer command-line flags over the loaded configuration
    fn apply(&self, config: &mut ServerConfig) -> Result<()> {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        match (self.port_arg, self.port) {
            (Some(positional), Some(flag)) if flag != 0 => {
                return Err(ShellError::Other(format!(
                    "conflicting ports: {} and --port {}",
                    positional, flag
                )));
            }
            (Some(port), _) | (None, Some(port)) => config.port = port,
            (None, None) => {}
        }
        if self.quiet {
            config.audit_logging = false;
        }
        if self.daemon {
            config.daemon = true;
        }
        if self.shared_namespace {
            config.namespace = NamespaceMode::Shared;
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let level = level.as_str().to_lowercase();
    let filter = EnvFilter::new(format!("socketshell={},socketshell_core={}", level, level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // Audit records share stderr
        .init();

    debug!("SocketShell v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = ServerConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config)?;

    let factory = HandlerFactory::new(&config, Arc::new(MiniPython::new()));
    let server = ShellServer::bind(&config, factory).await?;
    if !cli.quiet {
        eprintln!("running on {}", server.local_addr());
    }

    if config.daemon {
        let handle = server.spawn();
        tokio::signal::ctrl_c().await?;
        info!("Interrupted, stopping server");
        handle.stop()?;
        handle.join().await
    } else {
        let shutdown = server.shutdown_handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping server");
                let _ = shutdown.stop();
            }
        });
        server.serve_forever().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_port_and_quiet() {
        let cli = Cli::parse_from(["socketshell", "-q", "--shared-namespace", "4000"]);
        let mut config = ServerConfig::default();
        cli.apply(&mut config).unwrap();

        assert_eq!(config.port, 4000);
        assert!(!config.audit_logging);
        assert_eq!(config.namespace, NamespaceMode::Shared);
    }

    #[test]
    fn test_short_host_flag() {
        let cli = Cli::parse_from(["socketshell", "-h", "0.0.0.0", "-p", "2323"]);
        let mut config = ServerConfig::default();
        cli.apply(&mut config).unwrap();
        assert_eq!(config.bind_addr(), "0.0.0.0:2323");
    }

    #[test]
    fn test_conflicting_ports() {
        let cli = Cli::parse_from(["socketshell", "--port", "5000", "4000"]);
        assert!(cli.apply(&mut ServerConfig::default()).is_err());

        let cli = Cli::parse_from(["socketshell", "--port", "0", "4000"]);
        let mut config = ServerConfig::default();
        cli.apply(&mut config).unwrap();
        assert_eq!(config.port, 4000);
    }
}
