//! Node-local state: the in-memory keyspace and the write-ahead log.

mod glob;
mod keyspace;
mod wal;

pub use glob::*;
pub use keyspace::*;
pub use wal::*;
