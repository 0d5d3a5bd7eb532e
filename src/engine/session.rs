/// Where a command came from. Decides which side effects a write has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A query client: log to the WAL and broadcast to peers
    Client,
    /// A peer replicating its own write: log to the WAL only
    Peer,
    /// WAL recovery: apply to the keyspace only
    Replay,
}

/// Per-connection execution context.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    origin: Origin,
    client_id: Option<u64>,
}

impl Session {
    pub fn client(id: u64) -> Self {
        Self {
            origin: Origin::Client,
            client_id: Some(id),
        }
    }

    pub fn peer() -> Self {
        Self {
            origin: Origin::Peer,
            client_id: None,
        }
    }

    pub fn replay() -> Self {
        Self {
            origin: Origin::Replay,
            client_id: None,
        }
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Registry id of the query client, if any
    pub fn client_id(&self) -> Option<u64> {
        self.client_id
    }
}
