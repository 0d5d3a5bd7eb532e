//! A builder for assembling a [`Node`].
//!
//! [`NodeBuilder`] opens the write-ahead log, replays earlier log files into
//! the keyspace, binds both listeners and wires the engine to the peer mesh.
//! The accept loops are started separately so that nothing is served before
//! recovery has finished.
//!
//! ## Example
//! ```ignore
//! let (shutdown_tx, shutdown_rx) = watch::channel(());
//! let node = NodeBuilder::new(settings, shutdown_rx)
//!     .build()
//!     .await?
//!     .start_peer_server()
//!     .start_query_server()
//!     .ready()?;
//! node.run().await?;
//! ```

use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use nanoid::nanoid;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::metrics;
use crate::network::bind;
use crate::network::serve_peers;
use crate::network::serve_queries;
use crate::network::ClientRegistry;
use crate::storage::replay;
use crate::utils::async_task::spawn_task;
use crate::Engine;
use crate::Error;
use crate::Keyspace;
use crate::Mesh;
use crate::NetworkError;
use crate::Node;
use crate::Replicator;
use crate::Result;
use crate::ServerInfo;
use crate::Session;
use crate::Settings;
use crate::Wal;

pub struct NodeBuilder {
    settings: Arc<Settings>,
    node_id: Option<String>,
    shutdown_signal: watch::Receiver<()>,

    peer_listener: Option<TcpListener>,
    query_listener: Option<TcpListener>,
    handles: Vec<JoinHandle<()>>,
    node: Option<Arc<Node>>,
}

impl NodeBuilder {
    /// # Arguments
    /// * `settings` - Resolved node settings
    /// * `shutdown_signal` - Fires once to stop every service of the node
    pub fn new(
        settings: Settings,
        shutdown_signal: watch::Receiver<()>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            node_id: None,
            shutdown_signal,
            peer_listener: None,
            query_listener: None,
            handles: vec![],
            node: None,
        }
    }

    /// Uses a fixed node id instead of a random one
    pub fn node_id(
        mut self,
        id: impl Into<String>,
    ) -> Self {
        self.node_id = Some(id.into());
        self
    }

    /// Opens storage, recovers the keyspace and binds the listeners.
    ///
    /// # Errors
    /// Failing to open the WAL or to bind a listener is fatal.
    pub async fn build(mut self) -> Result<Self> {
        metrics::init_metrics();
        let settings = self.settings.clone();

        let wal = Arc::new(Wal::open(&settings.wal.dir).await?);
        info!(
            generation = wal.generation(),
            "write-ahead log opened at {}",
            wal.path().display()
        );

        let peer_listener = bind(settings.network.peer_listen).await?;
        let peer_addr = peer_listener.local_addr().map_err(NetworkError::Io)?;
        let query_listener = if settings.network.disable_query_server {
            info!("query service disabled");
            None
        } else {
            Some(bind(settings.network.query_listen).await?)
        };
        let query_addr = query_listener
            .as_ref()
            .map(TcpListener::local_addr)
            .transpose()
            .map_err(NetworkError::Io)?;

        let (mesh, dial_requests) = Mesh::new(&settings.mesh);
        let id = self.node_id.take().unwrap_or_else(|| nanoid!());
        let replicator: Arc<dyn Replicator> = Arc::new(mesh.clone());
        let engine = Arc::new(Engine::new(
            Arc::new(Keyspace::new()),
            wal.clone(),
            replicator,
            Arc::new(ClientRegistry::new()),
            ServerInfo {
                id: id.clone(),
                version: env!("CARGO_PKG_VERSION"),
                started_at: Instant::now(),
                peer_listen: peer_addr,
                query_listen: query_addr,
            },
        ));

        if settings.wal.replay_on_start {
            recover(&engine, &settings).await?;
        }

        info!(node = %id, %peer_addr, ?query_addr, "node built");
        self.peer_listener = Some(peer_listener);
        self.query_listener = query_listener;
        self.node = Some(Arc::new(Node {
            id,
            engine,
            mesh,
            wal,
            dial_requests: Mutex::new(Some(dial_requests)),
            handles: Mutex::new(vec![]),
            peer_addr,
            query_addr,
            ready: AtomicBool::new(false),
            settings,
            shutdown_signal: self.shutdown_signal.clone(),
        }));
        Ok(self)
    }

    /// Starts accepting peer connections.
    pub fn start_peer_server(mut self) -> Self {
        match (self.node.clone(), self.peer_listener.take()) {
            (Some(node), Some(listener)) => {
                let shutdown = self.shutdown_signal.clone();
                spawn_task(
                    "peer server",
                    move || {
                        serve_peers(
                            listener,
                            node.engine.clone(),
                            node.mesh.clone(),
                            node.settings.clone(),
                            shutdown,
                        )
                    },
                    Some(&mut self.handles),
                );
            }
            _ => warn!("peer server not started: node not built"),
        }
        self
    }

    /// Starts accepting query clients, unless the query service is disabled.
    pub fn start_query_server(mut self) -> Self {
        match (self.node.clone(), self.query_listener.take()) {
            (Some(node), Some(listener)) => {
                let shutdown = self.shutdown_signal.clone();
                spawn_task(
                    "query server",
                    move || serve_queries(listener, node.engine.clone(), node.settings.clone(), shutdown),
                    Some(&mut self.handles),
                );
            }
            (Some(_), None) => debug!("query server not started"),
            (None, _) => warn!("query server not started: node not built"),
        }
        self
    }

    /// Returns the built node.
    ///
    /// # Errors
    /// Returns `Error::Fatal` if [`NodeBuilder::build`] was not called
    pub fn ready(self) -> Result<Arc<Node>> {
        let node = self
            .node
            .ok_or_else(|| Error::Fatal("node is not built".to_string()))?;
        node.handles.lock().extend(self.handles);
        Ok(node)
    }

    /// Addresses the listeners are bound to, once built
    pub fn local_addrs(&self) -> Option<(SocketAddr, Option<SocketAddr>)> {
        self.node.as_ref().map(|n| (n.peer_addr, n.query_addr))
    }
}

/// Re-applies logged writes to the keyspace, without logging or
/// broadcasting them again.
async fn recover(
    engine: &Engine,
    settings: &Settings,
) -> Result<()> {
    let session = Session::replay();
    let mut failed = 0usize;
    let summary = replay(&settings.wal.dir, |command| {
        let reply = engine.execute(&session, &command);
        if reply.is_error() {
            failed += 1;
            debug!("replayed command failed: {}", reply.text());
        }
    })
    .await?;
    info!(
        files = summary.files,
        records = summary.records,
        truncated = summary.truncated_files,
        failed,
        keys = engine.keyspace().len(),
        "keyspace recovered from write-ahead log"
    );
    Ok(())
}
