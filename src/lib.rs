//! # meshkv
//!
//! An in-memory key-value node speaking a RESP-style protocol.
//!
//! Writes accepted from query clients are appended to a write-ahead log and
//! broadcast, best effort, to every connected peer of the mesh. Peers apply
//! replicated writes and log them, but never forward them again.
//!
//! ```text
//! client --> QueryCodec --> Engine --> Keyspace
//!                             |-----> Wal (append, async)
//!                             '-----> Mesh --> PeerNode --> peer connection
//! ```

mod config;
mod constants;
mod engine;
mod errors;
mod membership;
mod node;
mod storage;

pub mod metrics;
pub mod network;
pub mod protocol;
pub mod utils;

pub use config::*;
pub use engine::*;
pub use errors::*;
pub use membership::*;
pub use node::*;
pub use storage::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
