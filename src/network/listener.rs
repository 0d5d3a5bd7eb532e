//! Accept loops of the peer and query services.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::handle_client;
use super::run_peer_connection;
use crate::Engine;
use crate::Mesh;
use crate::NetworkError;
use crate::PeerDirection;
use crate::PeerNode;
use crate::Result;
use crate::Settings;

/// Binds `addr`, turning a failure into the fatal `BindFailed`.
pub async fn bind(addr: std::net::SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| NetworkError::BindFailed { addr, source }.into())
}

fn tune(
    stream: &TcpStream,
    nodelay: bool,
) {
    if let Err(e) = stream.set_nodelay(nodelay) {
        debug!("set_nodelay failed: {}", e);
    }
}

/// Accepts peer connections until shutdown.
///
/// Each remote becomes an inbound peer keyed by its socket address. It is
/// never redialed: when the connection ends the peer is removed and the
/// remote is expected to dial again.
pub async fn serve_peers(
    listener: TcpListener,
    engine: Arc<Engine>,
    mesh: Mesh,
    settings: Arc<Settings>,
    mut shutdown: watch::Receiver<()>,
) -> Result<()> {
    info!("peer service listening on {:?}", listener.local_addr());
    loop {
        let (stream, addr) = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("peer accept failed: {}", e);
                    continue;
                }
            },
        };
        tune(&stream, settings.network.tcp_nodelay);

        let peer = Arc::new(PeerNode::new(addr.to_string(), PeerDirection::Inbound));
        let engine = engine.clone();
        let mesh = mesh.clone();
        let config = settings.mesh.clone();
        tokio::spawn(async move {
            if let Err(e) = mesh.register(peer.clone()).await {
                warn!(peer = %addr, "inbound peer not registered: {}", e);
                return;
            }
            run_peer_connection(stream, peer.clone(), engine, config).await;
            peer.remove();
            if let Err(e) = mesh.deregister(peer).await {
                debug!(peer = %addr, "deregistration skipped: {}", e);
            }
        });
    }
    info!("peer service stopped");
    Ok(())
}

/// Accepts query clients until shutdown.
pub async fn serve_queries(
    listener: TcpListener,
    engine: Arc<Engine>,
    settings: Arc<Settings>,
    mut shutdown: watch::Receiver<()>,
) -> Result<()> {
    info!("query service listening on {:?}", listener.local_addr());
    loop {
        let (stream, addr) = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("client accept failed: {}", e);
                    continue;
                }
            },
        };
        tune(&stream, settings.network.tcp_nodelay);

        let engine = engine.clone();
        let read_buffer_size = settings.network.read_buffer_size;
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_client(stream, addr, engine, read_buffer_size, shutdown).await {
                debug!(%addr, "client connection ended: {}", e);
            }
        });
    }
    info!("query service stopped");
    Ok(())
}
