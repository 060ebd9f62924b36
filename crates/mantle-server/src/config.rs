use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use mantle_store::{Storage, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("--tls requires both --tls-cert and --tls-key")]
    MissingTlsFiles,
    #[error("--proxy-addr must be set in {0} mode")]
    MissingProxyAddr(Mode),
    #[error("storage: {0}")]
    Storage(#[from] StoreError),
}

/// How the listener serves requests.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum Mode {
    /// Answer every request locally.
    #[default]
    Direct,
    /// Forward every request to the upstream server untouched.
    Proxy,
    /// Answer locally and upstream, log differences, return the upstream reply.
    Diff,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Mode::Direct => "direct",
            Mode::Proxy => "proxy",
            Mode::Diff => "diff",
        })
    }
}

/// Command-line flags. Every flag can also be given through its `MANTLE_*`
/// environment variable.
#[derive(Parser, Debug, Clone)]
#[command(name = "mantle-server", version, about = "Document database wire-protocol front end")]
pub struct Args {
    /// Address to accept client connections on.
    #[arg(long, env = "MANTLE_LISTEN_ADDR", default_value = "127.0.0.1:27017")]
    pub listen_addr: String,

    #[arg(long, env = "MANTLE_MODE", value_enum, default_value_t = Mode::Direct)]
    pub mode: Mode,

    /// Upstream server used in proxy and diff modes.
    #[arg(long, env = "MANTLE_PROXY_ADDR", default_value = "127.0.0.1:37017")]
    pub proxy_addr: String,

    #[arg(long, env = "MANTLE_TLS")]
    pub tls: bool,

    /// PEM certificate chain.
    #[arg(long, env = "MANTLE_TLS_CERT")]
    pub tls_cert: Option<PathBuf>,

    /// PEM private key.
    #[arg(long, env = "MANTLE_TLS_KEY")]
    pub tls_key: Option<PathBuf>,

    /// Storage backend, e.g. `memory://?max_conns=16`.
    #[arg(long, env = "MANTLE_STORAGE_URL", default_value = "memory://")]
    pub storage_url: String,

    /// Address of the debug HTTP endpoint. Empty disables it.
    #[arg(long, env = "MANTLE_DEBUG_ADDR", default_value = "127.0.0.1:8088")]
    pub debug_addr: String,

    /// Seconds to wait for connections to finish on shutdown.
    #[arg(long, env = "MANTLE_SHUTDOWN_GRACE", default_value_t = 5)]
    pub shutdown_grace: u64,

    /// Idle read timeout per connection in seconds; 0 disables it.
    #[arg(long, env = "MANTLE_CONN_TIMEOUT", default_value_t = 0)]
    pub conn_timeout: u64,

    #[arg(long, env = "MANTLE_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub cert: PathBuf,
    pub key: PathBuf,
}

/// Validated process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: String,
    pub mode: Mode,
    pub proxy_addr: String,
    pub tls: Option<TlsFiles>,
    pub storage_url: String,
    pub debug_addr: Option<String>,
    pub shutdown_grace: Duration,
    pub conn_timeout: Option<Duration>,
    pub log_level: String,
}

impl Args {
    pub fn into_config(self) -> Result<Config, ConfigError> {
        let tls = match (self.tls, self.tls_cert, self.tls_key) {
            (false, _, _) => None,
            (true, Some(cert), Some(key)) => Some(TlsFiles { cert, key }),
            (true, _, _) => return Err(ConfigError::MissingTlsFiles),
        };
        if self.mode != Mode::Direct && self.proxy_addr.trim().is_empty() {
            return Err(ConfigError::MissingProxyAddr(self.mode));
        }

        Ok(Config {
            listen_addr: self.listen_addr,
            mode: self.mode,
            proxy_addr: self.proxy_addr,
            tls,
            storage_url: self.storage_url,
            debug_addr: Some(self.debug_addr).filter(|a| !a.trim().is_empty()),
            shutdown_grace: Duration::from_secs(self.shutdown_grace),
            conn_timeout: (self.conn_timeout > 0).then(|| Duration::from_secs(self.conn_timeout)),
            log_level: self.log_level,
        })
    }
}

impl Config {
    pub fn open_storage(&self) -> Result<Arc<dyn Storage>, ConfigError> {
        Ok(mantle_store::open(&self.storage_url)?)
    }
}
