//! Outbound peer dialing.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::run_peer_connection;
use crate::utils::async_task::jitter;
use crate::utils::async_task::Backoff;
use crate::Engine;
use crate::Mesh;
use crate::PeerNode;
use crate::PeerState;
use crate::Result;
use crate::Settings;

/// Keeps `peer` connected until it is removed.
///
/// Failed attempts and lost connections are retried after a doubling,
/// jittered delay. The delay goes back to its base after a successful
/// connect or when a reconnect is requested. When the retry policy gives
/// up, the peer is removed. Either way it is deregistered on return.
pub async fn run_dialer(
    peer: Arc<PeerNode>,
    engine: Arc<Engine>,
    mesh: Mesh,
    settings: Arc<Settings>,
) {
    let policy = settings.retry.peer_dial;
    let mut backoff = Backoff::new(&policy);

    while !peer.is_removed() {
        peer.set_state(PeerState::Connecting);
        let attempt = tokio::select! {
            _ = peer.removed().cancelled() => break,
            attempt = timeout(policy.timeout(), TcpStream::connect(peer.key())) => attempt,
        };

        match attempt {
            Ok(Ok(stream)) => {
                backoff.reset();
                if let Err(e) = stream.set_nodelay(settings.network.tcp_nodelay) {
                    debug!(peer = %peer.key(), "set_nodelay failed: {}", e);
                }
                run_peer_connection(stream, peer.clone(), engine.clone(), settings.mesh.clone()).await;
                if peer.is_removed() {
                    break;
                }
            }
            Ok(Err(e)) => debug!(peer = %peer.key(), "dial failed: {}", e),
            Err(_) => debug!(peer = %peer.key(), "dial timed out after {:?}", policy.timeout()),
        }
        peer.set_state(PeerState::NoConnection);

        let Some(delay) = backoff.next_delay() else {
            warn!(peer = %peer.key(), attempts = backoff.attempts(), "giving up on peer");
            peer.remove();
            break;
        };
        tokio::select! {
            _ = peer.removed().cancelled() => break,
            _ = peer.reconnect_requested() => {
                debug!(peer = %peer.key(), "reconnect requested");
                backoff.reset();
            }
            _ = sleep(jitter(delay)) => {}
        }
    }

    peer.set_state(PeerState::NoConnection);
    if let Err(e) = mesh.deregister(peer.clone()).await {
        debug!(peer = %peer.key(), "deregistration skipped: {}", e);
    }
    info!(peer = %peer.key(), "dialer stopped");
}

/// Spawns a dialer for every outbound peer the mesh queues.
pub async fn supervise_dialers(
    mut requests: mpsc::UnboundedReceiver<Arc<PeerNode>>,
    engine: Arc<Engine>,
    mesh: Mesh,
    settings: Arc<Settings>,
    mut shutdown: watch::Receiver<()>,
) -> Result<()> {
    loop {
        let peer = tokio::select! {
            _ = shutdown.changed() => break,
            peer = requests.recv() => match peer {
                Some(peer) => peer,
                None => break,
            },
        };
        debug!(peer = %peer.key(), "starting dialer");
        tokio::spawn(run_dialer(peer, engine.clone(), mesh.clone(), settings.clone()));
    }
    debug!("dial supervisor stopped");
    Ok(())
}
