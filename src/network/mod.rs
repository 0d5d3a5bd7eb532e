//! TCP services: the client query service and the peer mesh transport.

mod client_handler;
mod clients;
mod dialer;
mod listener;
mod peer_connection;
pub use client_handler::*;
pub use clients::*;
pub use dialer::*;
pub use listener::*;
pub use peer_connection::*;

#[cfg(test)]
mod peer_connection_test;
