use std::net::SocketAddr;

use serde::Deserialize;
use serde::Serialize;

use crate::utils::net::split_host_port;
use crate::Error;
use crate::Result;

/// Listener and bootstrap settings shared by the query and peer services
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// Address the peer mesh listener binds to
    #[serde(default = "default_peer_listen")]
    pub peer_listen: SocketAddr,

    /// Address the client query listener binds to
    #[serde(default = "default_query_listen")]
    pub query_listen: SocketAddr,

    /// Run without the client query listener (replication only)
    #[serde(default)]
    pub disable_query_server: bool,

    /// Peers dialed at startup, as `host:port`
    #[serde(default)]
    pub peers: Vec<String>,

    #[serde(default = "default_tcp_nodelay")]
    pub tcp_nodelay: bool,

    /// Initial capacity of per-connection read buffers in bytes
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            peer_listen: default_peer_listen(),
            query_listen: default_query_listen(),
            disable_query_server: false,
            peers: vec![],
            tcp_nodelay: default_tcp_nodelay(),
            read_buffer_size: default_read_buffer_size(),
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.read_buffer_size == 0 {
            return Err(Error::InvalidConfig("read_buffer_size must be greater than 0".into()));
        }

        for peer in &self.peers {
            if split_host_port(peer).is_none() {
                return Err(Error::InvalidConfig(format!(
                    "peer '{}' must be in host:port form",
                    peer
                )));
            }
        }

        Ok(())
    }
}

fn default_peer_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 4301))
}
fn default_query_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 4300))
}
fn default_tcp_nodelay() -> bool {
    true
}
fn default_read_buffer_size() -> usize {
    1024
}
