use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use nanoid::nanoid;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::oneshot;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use crate::constants::CORRELATION_ID_LEN;
use crate::metrics::PEER_FRAMES_DROPPED_TOTAL;
use crate::metrics::PEER_QUERY_TIMEOUTS_TOTAL;
use crate::protocol::PeerFrame;
use crate::protocol::Reply;
use crate::NetworkError;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    NoConnection = 0,
    Connecting = 1,
    Connected = 2,
}

impl PeerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerState::NoConnection => "No connection",
            PeerState::Connecting => "Connecting",
            PeerState::Connected => "Connected",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => PeerState::Connecting,
            2 => PeerState::Connected,
            _ => PeerState::NoConnection,
        }
    }
}

/// Which side opened the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerDirection {
    /// We dial `key` and redial it after failures
    Outbound,
    /// The remote dialed us; `key` is its socket address
    Inbound,
}

#[derive(Debug, Default)]
pub struct PeerStats {
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    failures: AtomicU64,
}

impl PeerStats {
    pub fn add_bytes_in(
        &self,
        n: usize,
    ) {
        self.bytes_in.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn add_bytes_out(
        &self,
        n: usize,
    ) {
        self.bytes_out.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in.load(Ordering::Relaxed)
    }

    pub fn bytes_out(&self) -> u64 {
        self.bytes_out.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

/// Outbound queues of a live connection, consumed by its writer tasks.
#[derive(Debug)]
pub struct PeerLink {
    pub queries: mpsc::Sender<PeerFrame>,
    pub responses: mpsc::Sender<PeerFrame>,
    /// Cancelled when the connection is torn down
    pub closed: CancellationToken,
}

/// Point-in-time view of a peer for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSummary {
    pub id: Option<String>,
    pub key: String,
    pub direction: PeerDirection,
    pub state: PeerState,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub failures: u64,
}

/// A remote node known to the mesh.
///
/// The connection may come and go; the node outlives it until removed.
/// Queries waiting for a response are tracked per correlation id and are
/// completed by the connection's response workers.
#[derive(Debug)]
pub struct PeerNode {
    key: String,
    direction: PeerDirection,
    id: ArcSwapOption<String>,
    state: AtomicU8,
    stats: PeerStats,
    waiting: DashMap<String, oneshot::Sender<Reply>>,
    link: Mutex<Option<PeerLink>>,
    removed: CancellationToken,
    reconnect: Notify,
}

impl PeerNode {
    pub fn new(
        key: impl Into<String>,
        direction: PeerDirection,
    ) -> Self {
        Self {
            key: key.into(),
            direction,
            id: ArcSwapOption::empty(),
            state: AtomicU8::new(PeerState::NoConnection as u8),
            stats: PeerStats::default(),
            waiting: DashMap::new(),
            link: Mutex::new(None),
            removed: CancellationToken::new(),
            reconnect: Notify::new(),
        }
    }

    /// Registry key: the dialed `host:port`, or the remote socket address
    /// for inbound peers.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn direction(&self) -> PeerDirection {
        self.direction
    }

    /// Identity announced by the remote node, once the handshake completed
    pub fn id(&self) -> Option<Arc<String>> {
        self.id.load_full()
    }

    pub fn set_id(
        &self,
        id: impl Into<String>,
    ) {
        self.id.store(Some(Arc::new(id.into())));
    }

    pub fn state(&self) -> PeerState {
        PeerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(
        &self,
        state: PeerState,
    ) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn stats(&self) -> &PeerStats {
        &self.stats
    }

    pub fn summary(&self) -> PeerSummary {
        PeerSummary {
            id: self.id().map(|id| id.as_ref().clone()),
            key: self.key.clone(),
            direction: self.direction,
            state: self.state(),
            bytes_in: self.stats.bytes_in(),
            bytes_out: self.stats.bytes_out(),
            failures: self.stats.failures(),
        }
    }

    // -
    // Lifecycle

    /// Installs the queues of a freshly established connection. A previous
    /// link, if any, is torn down.
    ///
    /// The peer stays `Connecting` until [`PeerNode::mark_connected`]: a
    /// link takes part in broadcasts only once the identity exchange on it
    /// has settled.
    pub fn attach(
        &self,
        link: PeerLink,
    ) {
        let mut guard = self.link.lock();
        if let Some(previous) = guard.replace(link) {
            previous.closed.cancel();
        }
        self.set_state(PeerState::Connecting);
    }

    /// Marks the peer connected, unless its link is already gone. Returns
    /// whether the state changed.
    pub fn mark_connected(&self) -> bool {
        let guard = self.link.lock();
        if guard.is_none() {
            return false;
        }
        self.set_state(PeerState::Connected);
        true
    }

    /// Drops the current link. Queries still waiting on it fail right away.
    pub fn detach(&self) {
        let mut guard = self.link.lock();
        if let Some(link) = guard.take() {
            link.closed.cancel();
        }
        self.set_state(PeerState::NoConnection);
        drop(guard);
        // Dropping the senders wakes the waiters with a closed channel.
        self.waiting.clear();
    }

    /// Flags the peer for removal: connection tasks and the dialer exit.
    pub fn remove(&self) {
        self.removed.cancel();
        self.detach();
    }

    pub fn is_removed(&self) -> bool {
        self.removed.is_cancelled()
    }

    pub fn removed(&self) -> &CancellationToken {
        &self.removed
    }

    /// Asks the dialer to retry now with a fresh backoff.
    pub fn request_reconnect(&self) {
        self.reconnect.notify_one();
    }

    pub async fn reconnect_requested(&self) {
        self.reconnect.notified().await
    }

    // -
    // Traffic

    /// Queues a query frame without waiting. When the peer is not connected
    /// or its queue is full the frame is dropped.
    pub fn enqueue_query(
        &self,
        frame: PeerFrame,
    ) -> Result<(), NetworkError> {
        let guard = self.link.lock();
        let link = guard.as_ref().ok_or_else(|| NetworkError::NotConnected(self.key.clone()))?;
        self.try_enqueue(&link.queries, frame)
    }

    /// Queues a response frame without waiting, under the same drop policy
    /// as [`PeerNode::enqueue_query`].
    pub fn enqueue_response(
        &self,
        frame: PeerFrame,
    ) -> Result<(), NetworkError> {
        let guard = self.link.lock();
        let link = guard.as_ref().ok_or_else(|| NetworkError::NotConnected(self.key.clone()))?;
        self.try_enqueue(&link.responses, frame)
    }

    fn try_enqueue(
        &self,
        queue: &mpsc::Sender<PeerFrame>,
        frame: PeerFrame,
    ) -> Result<(), NetworkError> {
        match queue.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                PEER_FRAMES_DROPPED_TOTAL
                    .with_label_values(&[&self.key, "outbound"])
                    .inc();
                Err(NetworkError::QueueFull(self.key.clone()))
            }
            Err(TrySendError::Closed(_)) => Err(NetworkError::NotConnected(self.key.clone())),
        }
    }

    /// Sends `raw` to the peer and waits for the correlated response.
    ///
    /// A query that cannot be sent is dropped like any other best-effort
    /// frame; the caller still gets `NetworkError::Timeout` once `timeout`
    /// has elapsed. A connection torn down while waiting fails early with
    /// `NetworkError::NotConnected`.
    pub async fn query(
        &self,
        raw: &[u8],
        timeout: Duration,
    ) -> Result<Reply, NetworkError> {
        let correlation_id = nanoid!(CORRELATION_ID_LEN);
        let (tx, rx) = oneshot::channel();
        self.waiting.insert(correlation_id.clone(), tx);

        if let Err(e) = self.enqueue_query(PeerFrame::query(&correlation_id, raw)) {
            debug!(peer = %self.key, "query {} not sent: {}", correlation_id, e);
        }

        let result = tokio::time::timeout(timeout, rx).await;
        self.waiting.remove(&correlation_id);

        match result {
            Ok(Ok(reply)) => Ok(reply),
            // waiter dropped by `detach`
            Ok(Err(_)) => Err(NetworkError::NotConnected(self.key.clone())),
            Err(_) => {
                PEER_QUERY_TIMEOUTS_TOTAL.with_label_values(&[&self.key]).inc();
                warn!(peer = %self.key, "query {} timed out", correlation_id);
                Err(NetworkError::Timeout {
                    correlation_id,
                    duration: timeout,
                })
            }
        }
    }

    /// Hands a response to the query waiting on `correlation_id`. Returns
    /// false when nobody waits for it (a broadcast, or a query that already
    /// timed out).
    pub fn resolve(
        &self,
        correlation_id: &str,
        reply: Reply,
    ) -> bool {
        match self.waiting.remove(correlation_id) {
            Some((_, waiter)) => waiter.send(reply).is_ok(),
            None => {
                trace!(peer = %self.key, "no waiter for response {}", correlation_id);
                false
            }
        }
    }

    pub fn waiting_len(&self) -> usize {
        self.waiting.len()
    }
}
