//! A running mesh node.
//!
//! ## Key Responsibilities
//! - Owns the engine, the peer mesh and the write-ahead log
//! - Dials the configured startup peers and every peer added later
//! - Runs until the shutdown signal fires, then stops the mesh and waits
//!   for the log to be closed
//!
//! ## Example Usage
//! ```rust,ignore
//! let node = NodeBuilder::new(settings, shutdown_rx).build().await?.start_peer_server().ready()?;
//! tokio::spawn(async move {
//!     node.run().await.expect("node execution failed");
//! });
//! ```

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use tracing::warn;

use crate::network::supervise_dialers;
use crate::utils::async_task::spawn_task;
use crate::Engine;
use crate::Error;
use crate::Mesh;
use crate::PeerNode;
use crate::Result;
use crate::Settings;
use crate::Wal;

pub struct Node {
    pub(crate) id: String,
    pub(crate) engine: Arc<Engine>,
    pub(crate) mesh: Mesh,
    pub(crate) wal: Arc<Wal>,

    // Consumed by the first `run`
    pub(crate) dial_requests: Mutex<Option<mpsc::UnboundedReceiver<Arc<PeerNode>>>>,
    pub(crate) handles: Mutex<Vec<JoinHandle<()>>>,

    pub(crate) peer_addr: SocketAddr,
    pub(crate) query_addr: Option<SocketAddr>,
    pub(crate) ready: AtomicBool,

    pub settings: Arc<Settings>,
    pub(crate) shutdown_signal: watch::Receiver<()>,
}

impl std::fmt::Debug for Node {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("query_addr", &self.query_addr)
            .finish()
    }
}

impl Node {
    /// Serves until the shutdown signal fires.
    ///
    /// # Errors
    /// Returns `Error::Fatal` when called a second time.
    pub async fn run(&self) -> Result<()> {
        let dial_requests = self
            .dial_requests
            .lock()
            .take()
            .ok_or_else(|| Error::Fatal("node is already running".to_string()))?;

        // 1. Dial every peer the mesh queues
        let engine = self.engine.clone();
        let mesh = self.mesh.clone();
        let settings = self.settings.clone();
        let shutdown = self.shutdown_signal.clone();
        let mut handles = vec![];
        spawn_task(
            "dial supervisor",
            move || supervise_dialers(dial_requests, engine, mesh, settings, shutdown),
            Some(&mut handles),
        );

        // 2. Startup peers
        for addr in &self.settings.network.peers {
            if let Err(e) = self.mesh.connect_to(addr).await {
                warn!(peer = %addr, "startup peer not added: {}", e);
            }
        }

        self.set_ready(true);
        info!(node = %self.id, "node is ready");

        // 3. Wait for the shutdown signal
        let mut shutdown = self.shutdown_signal.clone();
        if shutdown.changed().await.is_err() {
            warn!("shutdown signal sender dropped");
        }
        self.set_ready(false);
        info!(node = %self.id, "node shutting down");

        // 4. Stop peers and drain the log
        self.mesh.shutdown();
        handles.extend(self.handles.lock().drain(..));
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("node task failed: {}", e);
            }
        }
        self.wal.close().await;
        info!(node = %self.id, "node stopped");
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    /// Bound address of the peer listener
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Bound address of the query listener, unless it is disabled
    pub fn query_addr(&self) -> Option<SocketAddr> {
        self.query_addr
    }

    pub fn set_ready(
        &self,
        is_ready: bool,
    ) {
        self.ready.store(is_ready, Ordering::SeqCst);
    }

    pub fn server_is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}
