use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Tuning for peer connections and the mesh registry
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MeshConfig {
    /// Reader tasks per inbound stream (queries and responses) on each peer connection
    #[serde(default = "default_workers_per_peer")]
    pub workers_per_peer: usize,

    /// Capacity of the inbound query/response queues fed by the read loop
    #[serde(default = "default_queue_capacity")]
    pub inbound_queue_capacity: usize,

    /// Capacity of the outbound query/response queues drained by the writers
    #[serde(default = "default_queue_capacity")]
    pub outbound_queue_capacity: usize,

    /// Capacity of the register/deregister channel
    #[serde(default = "default_registry_queue_capacity")]
    pub registry_queue_capacity: usize,

    /// Upper bound on waiting for room in the registry channel
    #[serde(default = "default_registry_send_timeout_ms")]
    pub registry_send_timeout_ms: u64,

    /// Peer round-trip timeout (unit: milliseconds)
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            workers_per_peer: default_workers_per_peer(),
            inbound_queue_capacity: default_queue_capacity(),
            outbound_queue_capacity: default_queue_capacity(),
            registry_queue_capacity: default_registry_queue_capacity(),
            registry_send_timeout_ms: default_registry_send_timeout_ms(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl MeshConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn registry_send_timeout(&self) -> Duration {
        Duration::from_millis(self.registry_send_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers_per_peer == 0 {
            return Err(Error::InvalidConfig("workers_per_peer must be at least 1".into()));
        }
        if self.inbound_queue_capacity == 0
            || self.outbound_queue_capacity == 0
            || self.registry_queue_capacity == 0
        {
            return Err(Error::InvalidConfig("mesh queue capacities must be greater than 0".into()));
        }
        if self.query_timeout_ms == 0 {
            return Err(Error::InvalidConfig("query_timeout_ms must be greater than 0".into()));
        }
        Ok(())
    }
}

fn default_workers_per_peer() -> usize {
    4
}
fn default_queue_capacity() -> usize {
    128
}
fn default_registry_queue_capacity() -> usize {
    16
}
fn default_registry_send_timeout_ms() -> u64 {
    1000
}
fn default_query_timeout_ms() -> u64 {
    3000
}
