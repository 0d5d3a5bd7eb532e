use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use nanoid::nanoid;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use super::PeerDirection;
use super::PeerNode;
use super::PeerState;
use super::PeerSummary;
use super::Replicator;
use crate::constants::CORRELATION_ID_LEN;
use crate::metrics;
use crate::protocol::PeerFrame;
use crate::MeshConfig;
use crate::NetworkError;

type PeerMap = HashMap<String, Arc<PeerNode>>;

#[derive(Debug)]
enum RegistryEvent {
    Register(Arc<PeerNode>),
    Deregister(Arc<PeerNode>),
    /// Acknowledged after every earlier event has been applied
    Sync(oneshot::Sender<()>),
}

/// Registry of known peers.
///
/// The map is owned by a single registry task and only changes through
/// [`Mesh::register`] and [`Mesh::deregister`]. After each change the task
/// publishes an immutable snapshot, which is what lookups and broadcasts
/// read. `Mesh` is a cheap handle; clones share the same registry.
#[derive(Debug, Clone)]
pub struct Mesh {
    events: mpsc::Sender<RegistryEvent>,
    snapshot: Arc<ArcSwap<PeerMap>>,
    dial_requests: mpsc::UnboundedSender<Arc<PeerNode>>,
    send_timeout: Duration,
    shutdown: CancellationToken,
}

impl Mesh {
    /// Starts the registry task.
    ///
    /// Returns the handle and the queue of outbound peers waiting to be
    /// dialed, which the node's connection supervisor drains.
    pub fn new(config: &MeshConfig) -> (Self, mpsc::UnboundedReceiver<Arc<PeerNode>>) {
        let (events_tx, events_rx) = mpsc::channel(config.registry_queue_capacity);
        let (dial_tx, dial_rx) = mpsc::unbounded_channel();
        let snapshot = Arc::new(ArcSwap::from_pointee(PeerMap::new()));
        let shutdown = CancellationToken::new();

        tokio::spawn(run_registry(events_rx, snapshot.clone(), shutdown.clone()));

        (
            Self {
                events: events_tx,
                snapshot,
                dial_requests: dial_tx,
                send_timeout: config.registry_send_timeout(),
                shutdown,
            },
            dial_rx,
        )
    }

    /// Adds `peer`, replacing (and removing) any other peer under its key.
    ///
    /// Waits at most `registry_send_timeout` for room in the registry queue.
    pub async fn register(
        &self,
        peer: Arc<PeerNode>,
    ) -> Result<(), NetworkError> {
        self.send(RegistryEvent::Register(peer)).await
    }

    /// Removes `peer` if it is still the entry registered under its key.
    pub async fn deregister(
        &self,
        peer: Arc<PeerNode>,
    ) -> Result<(), NetworkError> {
        self.send(RegistryEvent::Deregister(peer)).await
    }

    /// Resolves once every registration sent before it is visible.
    pub async fn sync(&self) -> Result<(), NetworkError> {
        let (tx, rx) = oneshot::channel();
        self.send(RegistryEvent::Sync(tx)).await?;
        rx.await.map_err(|_| NetworkError::RegistryUnavailable)
    }

    async fn send(
        &self,
        event: RegistryEvent,
    ) -> Result<(), NetworkError> {
        self.events.send_timeout(event, self.send_timeout).await.map_err(|e| {
            warn!("mesh registry did not accept event: {}", e);
            NetworkError::RegistryUnavailable
        })
    }

    /// Registers an outbound peer for `addr` and queues it for dialing.
    pub async fn connect_to(
        &self,
        addr: &str,
    ) -> Result<Arc<PeerNode>, NetworkError> {
        let peer = Arc::new(PeerNode::new(addr, PeerDirection::Outbound));
        self.register(peer.clone()).await?;
        self.dial_requests
            .send(peer.clone())
            .map_err(|_| NetworkError::RegistryUnavailable)?;
        info!(peer = %addr, "peer registered for dialing");
        Ok(peer)
    }

    pub fn find_by_key(
        &self,
        key: &str,
    ) -> Option<Arc<PeerNode>> {
        self.snapshot.load().get(key).filter(|p| !p.is_removed()).cloned()
    }

    /// Live peers, sorted by key
    pub fn nodes(&self) -> Vec<Arc<PeerNode>> {
        let mut nodes: Vec<Arc<PeerNode>> = self
            .snapshot
            .load()
            .values()
            .filter(|p| !p.is_removed())
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.key().cmp(b.key()));
        nodes
    }

    /// Number of registered entries as of the last published snapshot
    pub fn len(&self) -> usize {
        self.snapshot.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot.load().is_empty()
    }

    pub fn connected_len(&self) -> usize {
        self.snapshot
            .load()
            .values()
            .filter(|p| p.state() == PeerState::Connected)
            .count()
    }

    /// Flags every peer for removal and stops the registry task.
    pub fn shutdown(&self) {
        for peer in self.snapshot.load().values() {
            peer.remove();
        }
        self.shutdown.cancel();
    }
}

async fn run_registry(
    mut events: mpsc::Receiver<RegistryEvent>,
    snapshot: Arc<ArcSwap<PeerMap>>,
    shutdown: CancellationToken,
) {
    let mut peers = PeerMap::new();
    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        trace!("mesh registry event: {:?}", event);

        match event {
            RegistryEvent::Register(peer) => {
                let key = peer.key().to_string();
                if let Some(previous) = peers.insert(key.clone(), peer.clone()) {
                    if !Arc::ptr_eq(&previous, &peer) {
                        debug!(peer = %key, "replacing registered peer");
                        previous.remove();
                    }
                }
                snapshot.store(Arc::new(peers.clone()));
            }
            RegistryEvent::Deregister(peer) => {
                let current = peers.get(peer.key()).is_some_and(|p| Arc::ptr_eq(p, &peer));
                if current {
                    peers.remove(peer.key());
                    snapshot.store(Arc::new(peers.clone()));
                    metrics::forget_peer(peer.key());
                    debug!(peer = %peer.key(), "peer deregistered");
                }
            }
            RegistryEvent::Sync(ack) => {
                let _ = ack.send(());
            }
        }
    }
    info!("mesh registry stopped");
}

/// Connected peers, outbound links first and then by key, so that a node
/// reachable over several links is always sent to over the same one.
fn broadcast_targets(peers: &PeerMap) -> Vec<Arc<PeerNode>> {
    let mut targets: Vec<Arc<PeerNode>> = peers
        .values()
        .filter(|p| p.state() == PeerState::Connected)
        .cloned()
        .collect();
    targets.sort_by(|a, b| {
        let a_inbound = a.direction() == PeerDirection::Inbound;
        let b_inbound = b.direction() == PeerDirection::Inbound;
        a_inbound.cmp(&b_inbound).then_with(|| a.key().cmp(b.key()))
    });
    targets
}

impl Replicator for Mesh {
    fn broadcast(
        &self,
        raw: &[u8],
    ) -> usize {
        let mut sent = 0;
        let mut reached: HashSet<Arc<String>> = HashSet::new();
        for peer in broadcast_targets(&self.snapshot.load()) {
            // Two nodes that dial each other share two links; one is enough.
            if let Some(id) = peer.id() {
                if !reached.insert(id) {
                    trace!(peer = %peer.key(), "remote already reached on another link");
                    continue;
                }
            }
            let frame = PeerFrame::query(&nanoid!(CORRELATION_ID_LEN), raw);
            match peer.enqueue_query(frame) {
                Ok(()) => sent += 1,
                Err(e) => debug!(peer = %peer.key(), "broadcast skipped: {}", e),
            }
        }
        sent
    }

    fn connect(
        &self,
        addr: &str,
    ) {
        if let Some(peer) = self.find_by_key(addr) {
            debug!(peer = %addr, "already known, requesting reconnect");
            peer.request_reconnect();
            return;
        }
        let mesh = self.clone();
        let addr = addr.to_string();
        tokio::spawn(async move {
            if let Err(e) = mesh.connect_to(&addr).await {
                warn!(peer = %addr, "peer connect failed: {}", e);
            }
        });
    }

    fn remove(
        &self,
        key: &str,
    ) -> bool {
        let Some(peer) = self.find_by_key(key) else {
            return false;
        };
        peer.remove();
        let mesh = self.clone();
        tokio::spawn(async move {
            if let Err(e) = mesh.deregister(peer).await {
                warn!("peer deregistration failed: {}", e);
            }
        });
        true
    }

    fn peers(&self) -> Vec<PeerSummary> {
        self.nodes().iter().map(|p| p.summary()).collect()
    }
}
