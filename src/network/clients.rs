use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    pub id: u64,
    pub addr: SocketAddr,
    pub name: Option<String>,
}

/// Connected query clients, for `client` and `info` introspection.
#[derive(Debug)]
pub struct ClientRegistry {
    next_id: AtomicU64,
    clients: DashMap<u64, ClientInfo>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            clients: DashMap::new(),
        }
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a client and returns its id. Ids start at 1 and are never reused.
    pub fn register(
        &self,
        addr: SocketAddr,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.clients.insert(id, ClientInfo { id, addr, name: None });
        id
    }

    pub fn unregister(
        &self,
        id: u64,
    ) {
        self.clients.remove(&id);
    }

    /// Returns false if the client is gone.
    pub fn set_name(
        &self,
        id: u64,
        name: &str,
    ) -> bool {
        match self.clients.get_mut(&id) {
            Some(mut client) => {
                client.name = Some(name.to_string());
                true
            }
            None => false,
        }
    }

    pub fn name(
        &self,
        id: u64,
    ) -> Option<String> {
        self.clients.get(&id).and_then(|c| c.name.clone())
    }

    pub fn find_by_addr(
        &self,
        addr: &str,
    ) -> Option<u64> {
        self.clients
            .iter()
            .find(|c| c.addr.to_string() == addr)
            .map(|c| c.id)
    }

    /// Snapshot sorted by id
    pub fn list(&self) -> Vec<ClientInfo> {
        let mut clients: Vec<ClientInfo> = self.clients.iter().map(|c| c.value().clone()).collect();
        clients.sort_by_key(|c| c.id);
        clients
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
