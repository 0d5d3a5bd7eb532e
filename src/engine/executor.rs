use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::dispatch::resolve;
use super::dispatch::Invocation;
use super::Origin;
use super::Session;
use crate::metrics::COMMANDS_TOTAL;
use crate::network::ClientRegistry;
use crate::protocol::Command;
use crate::protocol::Reply;
use crate::CommandError;
use crate::Keyspace;
use crate::Replicator;
use crate::Wal;

/// Static facts about the running node, reported by `info server`.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub id: String,
    pub version: &'static str,
    pub started_at: Instant,
    pub peer_listen: SocketAddr,
    pub query_listen: Option<SocketAddr>,
}

/// Executes parsed commands against the keyspace.
///
/// Writes that succeed are appended to the WAL and fanned out to peers,
/// depending on the [`Origin`] of the session. Neither waits: the reply
/// is ready as soon as the keyspace has changed.
pub struct Engine {
    keyspace: Arc<Keyspace>,
    wal: Arc<Wal>,
    replicator: Arc<dyn Replicator>,
    clients: Arc<ClientRegistry>,
    server: ServerInfo,
}

impl std::fmt::Debug for Engine {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("server", &self.server)
            .field("keys", &self.keyspace.len())
            .finish()
    }
}

impl Engine {
    pub fn new(
        keyspace: Arc<Keyspace>,
        wal: Arc<Wal>,
        replicator: Arc<dyn Replicator>,
        clients: Arc<ClientRegistry>,
        server: ServerInfo,
    ) -> Self {
        Self {
            keyspace,
            wal,
            replicator,
            clients,
            server,
        }
    }

    /// Runs `command`, turning any failure into an error reply.
    pub fn execute(
        &self,
        session: &Session,
        command: &Command,
    ) -> Reply {
        match self.try_execute(session, command) {
            Ok(reply) => reply,
            Err(e) => {
                debug!("command failed: {}", e);
                Reply::error(e.to_string())
            }
        }
    }

    pub fn try_execute(
        &self,
        session: &Session,
        command: &Command,
    ) -> Result<Reply, CommandError> {
        let verb = command.verb().unwrap_or_default();
        let args = command.args().get(1..).unwrap_or_default();
        let (entry, handler) = resolve(&verb, args)?;
        COMMANDS_TOTAL.with_label_values(&[entry.name]).inc();

        let reply = handler(&Invocation {
            engine: self,
            session,
            args,
        })?;

        if entry.mutates {
            self.propagate(session, command.raw());
        }
        Ok(reply)
    }

    fn propagate(
        &self,
        session: &Session,
        raw: &[u8],
    ) {
        if session.origin() == Origin::Replay {
            return;
        }
        if let Err(e) = self.wal.append(raw) {
            warn!("write not logged: {}", e);
        }
        if session.origin() == Origin::Client {
            let peers = self.replicator.broadcast(raw);
            trace!(peers, "write broadcast");
        }
    }

    pub fn keyspace(&self) -> &Keyspace {
        &self.keyspace
    }

    pub fn wal(&self) -> &Wal {
        &self.wal
    }

    pub fn replicator(&self) -> &dyn Replicator {
        self.replicator.as_ref()
    }

    pub fn clients(&self) -> &ClientRegistry {
        &self.clients
    }

    pub fn server(&self) -> &ServerInfo {
        &self.server
    }
}
