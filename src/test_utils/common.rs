use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tempfile::TempDir;

use crate::network::ClientRegistry;
use crate::Engine;
use crate::Keyspace;
use crate::MockReplicator;
use crate::Replicator;
use crate::ServerInfo;
use crate::Wal;

/// An engine over a WAL in a temporary directory, removed on drop.
pub(crate) struct TestEngine {
    pub engine: Arc<Engine>,
    pub keyspace: Arc<Keyspace>,
    pub clients: Arc<ClientRegistry>,
    pub wal: Arc<Wal>,
    _dir: TempDir,
}

pub(crate) async fn test_engine(
    id: &str,
    replicator: Arc<dyn Replicator>,
) -> TestEngine {
    let dir = tempfile::tempdir().unwrap();
    let wal = Arc::new(Wal::open(dir.path()).await.unwrap());
    let keyspace = Arc::new(Keyspace::new());
    let clients = Arc::new(ClientRegistry::new());
    let engine = Arc::new(Engine::new(
        keyspace.clone(),
        wal.clone(),
        replicator,
        clients.clone(),
        ServerInfo {
            id: id.to_string(),
            version: env!("CARGO_PKG_VERSION"),
            started_at: Instant::now(),
            peer_listen: "127.0.0.1:4301".parse::<SocketAddr>().unwrap(),
            query_listen: None,
        },
    ));
    TestEngine {
        engine,
        keyspace,
        clients,
        wal,
        _dir: dir,
    }
}

/// Replicator mock that accepts any broadcast and knows no peers.
pub(crate) fn quiet_replicator() -> Arc<MockReplicator> {
    let mut replicator = MockReplicator::new();
    replicator.expect_broadcast().returning(|_| 0);
    replicator.expect_peers().returning(Vec::new);
    replicator.expect_connect().returning(|_| ());
    replicator.expect_remove().returning(|_| false);
    Arc::new(replicator)
}
