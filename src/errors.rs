//! Error hierarchy for the key-value node.
//!
//! Errors are grouped by the layer that raises them (wire protocol, command
//! execution, storage, peer networking) and aggregated into [`Error`].
//! Protocol and command errors are recoverable at the connection level and
//! are reported back to the caller as error replies; storage and network
//! errors are logged by the owning task.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed wire frames
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Command grammar and execution failures
    #[error(transparent)]
    Command(#[from] CommandError),

    /// Keyspace and write-ahead log failures
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Peer and listener failures
    #[error(transparent)]
    Network(#[from] NetworkError),

    /// Configuration source or deserialization failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Configuration values that fail validation
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Signal sender closed: {0}")]
    SignalSenderClosed(String),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Frame structure does not follow the array/bulk grammar
    #[error("Protocol error: {0}")]
    Malformed(String),

    /// A length header is not a valid non-negative integer
    #[error("Protocol error: invalid length '{0}'")]
    InvalidLength(String),

    /// Peer frame with a tag that is neither query nor response
    #[error("Protocol error: unknown frame tag {0:#04x}")]
    UnknownFrameTag(u8),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Command failures. The display strings are the messages written back to
/// the client after the `-` error prefix.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("ERR unknown command '{0}'")]
    UnknownCommand(String),

    #[error("Too few arguments")]
    TooFewArguments,

    #[error("Too many arguments")]
    TooManyArguments,

    #[error("Value is not an integer or out of range")]
    NotAnInteger,

    #[error("invalid DB index")]
    InvalidDbIndex,

    #[error("syntax error")]
    Syntax,

    #[error("No such client")]
    NoSuchClient,

    #[error("Peer {0} not found in peer list")]
    PeerNotFound(String),

    /// Help text surfaced as an error payload
    #[error("{0}")]
    Help(String),

    /// A peer round-trip failed while serving the command
    #[error("{0}")]
    Remote(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Error occurred at path: {path}")]
    PathError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Append attempted after the log was closed
    #[error("Write-ahead log is closed")]
    WalClosed,

    /// A record in a log file could not be decoded during replay
    #[error("Corrupt WAL record in {file} at offset {offset}")]
    CorruptRecord { file: PathBuf, offset: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// No response arrived for a correlated peer query
    #[error("timeout waiting response for query {correlation_id} after {duration:?}")]
    Timeout {
        correlation_id: String,
        duration: Duration,
    },

    #[error("Socket connect to {0} failed")]
    ConnectError(String),

    #[error("Peer {0} is not connected")]
    NotConnected(String),

    /// Bounded peer queue rejected a frame
    #[error("Outbound queue for peer {0} is full")]
    QueueFull(String),

    /// The mesh registry task is gone or did not accept the event in time
    #[error("Mesh registry unavailable")]
    RegistryUnavailable,

    #[error("Failed to bind {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
