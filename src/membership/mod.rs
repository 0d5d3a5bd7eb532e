//! Peer membership: the mesh registry, per-peer state and the replication
//! seam used by the command engine.

mod mesh;
mod peer_node;
pub use mesh::*;
pub use peer_node::*;


#[cfg(test)]
use mockall::automock;

/// What the command engine needs from the peer mesh.
#[cfg_attr(test, automock)]
pub trait Replicator: Send + Sync + 'static {
    /// Best-effort fan-out of a locally executed write to every connected
    /// peer. Returns how many peers the frame was queued for.
    fn broadcast(
        &self,
        raw: &[u8],
    ) -> usize;

    /// Starts connecting to `addr` in the background.
    fn connect(
        &self,
        addr: &str,
    );

    /// Removes the peer registered under `key`. False if there is none.
    fn remove(
        &self,
        key: &str,
    ) -> bool;

    /// Known peers, sorted by key
    fn peers(&self) -> Vec<PeerSummary>;
}
