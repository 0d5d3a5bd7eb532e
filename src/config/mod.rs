//! Configuration management for a mesh node.
//!
//! Settings are resolved from several sources, later ones winning:
//! 1. Default values (hardcoded)
//! 2. Optional TOML file (`--config` or `CONFIG_PATH`)
//! 3. Prefixed environment variables (`MESHKV__SECTION__FIELD`)
//! 4. Flat environment variables (`PEER_LISTEN`, `QUERY_LISTEN`, `PEERS`, `WAL_DIR`)
//! 5. Command line overrides (highest priority)

mod mesh;
mod network;
mod retry;
mod wal;
pub use mesh::*;
pub use network::*;
pub use retry::*;
pub use wal::*;


//---
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::utils::net::parse_peer_list;
use crate::Error;
use crate::Result;

/// Environment prefix for structured overrides, e.g. `MESHKV__MESH__QUERY_TIMEOUT_MS`
pub const ENV_PREFIX: &str = "MESHKV";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Settings {
    /// Listener addresses and initial peers
    #[serde(default)]
    pub network: NetworkConfig,
    /// Per-peer worker pools, queues and round-trip timeout
    #[serde(default)]
    pub mesh: MeshConfig,
    /// Retry policies for outbound operations
    #[serde(default)]
    pub retry: RetryPolicies,
    /// Write-ahead log location and recovery
    #[serde(default)]
    pub wal: WalConfig,
}

/// Values given on the command line. Every field left as `None` keeps the
/// value resolved from files and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_path: Option<String>,
    pub peer_listen: Option<SocketAddr>,
    pub query_listen: Option<SocketAddr>,
    pub peers: Option<String>,
    pub wal_dir: Option<PathBuf>,
    pub disable_query_server: bool,
}

impl Settings {
    /// Load configuration from all sources and apply command line overrides.
    ///
    /// # Errors
    /// Returns `Error::Config` when a source cannot be read or deserialized and
    /// `Error::InvalidConfig` when the merged result fails validation.
    pub fn load(overrides: &Overrides) -> Result<Self> {
        let mut builder = Config::builder();

        let file = overrides
            .config_path
            .clone()
            .or_else(|| env::var("CONFIG_PATH").ok());
        if let Some(path) = file {
            builder = builder.add_source(File::with_name(&path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("network.peers"),
        );

        let mut settings: Settings = builder.build()?.try_deserialize()?;
        settings.apply_flat_env()?;
        settings.apply_overrides(overrides);
        settings.validate()?;
        Ok(settings)
    }

    /// Flat variable names kept for deployments that predate the prefixed form.
    fn apply_flat_env(&mut self) -> Result<()> {
        if let Ok(v) = env::var("PEER_LISTEN") {
            if !v.is_empty() {
                self.network.peer_listen = parse_listen_addr("PEER_LISTEN", &v)?;
            }
        }
        if let Ok(v) = env::var("QUERY_LISTEN") {
            if !v.is_empty() {
                self.network.query_listen = parse_listen_addr("QUERY_LISTEN", &v)?;
            }
        }
        if let Ok(v) = env::var("PEERS") {
            if !v.is_empty() {
                self.network.peers = parse_peer_list(&v);
            }
        }
        if let Ok(v) = env::var("WAL_DIR") {
            if !v.is_empty() {
                self.wal.dir = PathBuf::from(v);
            }
        }
        Ok(())
    }

    pub fn apply_overrides(
        &mut self,
        overrides: &Overrides,
    ) {
        if let Some(addr) = overrides.peer_listen {
            self.network.peer_listen = addr;
        }
        if let Some(addr) = overrides.query_listen {
            self.network.query_listen = addr;
        }
        if let Some(peers) = &overrides.peers {
            self.network.peers = parse_peer_list(peers);
        }
        if let Some(dir) = &overrides.wal_dir {
            self.wal.dir = dir.clone();
        }
        if overrides.disable_query_server {
            self.network.disable_query_server = true;
        }
    }

    /// Validates the merged configuration
    /// # Errors
    /// Returns `Error::InvalidConfig` if any section is inconsistent
    pub fn validate(&self) -> Result<()> {
        self.network.validate()?;
        self.mesh.validate()?;
        self.retry.validate()?;
        self.wal.validate()?;
        Ok(())
    }
}

fn parse_listen_addr(
    name: &str,
    value: &str,
) -> Result<SocketAddr> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::InvalidConfig(format!("{} '{}' is not a socket address: {}", name, value, e)))
}
