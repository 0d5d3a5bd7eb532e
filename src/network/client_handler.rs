//! Per-connection loop of the client query service.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio_util::codec::Decoder;
use tracing::debug;
use tracing::trace;

use crate::protocol::Command;
use crate::protocol::QueryCodec;
use crate::protocol::Reply;
use crate::Engine;
use crate::NetworkError;
use crate::Session;

/// Serves one client until it quits, disconnects or the node shuts down.
///
/// The client is listed in the engine's client registry for the lifetime
/// of the call.
pub async fn handle_client<S>(
    stream: S,
    addr: SocketAddr,
    engine: Arc<Engine>,
    read_buffer_size: usize,
    shutdown: watch::Receiver<()>,
) -> Result<(), NetworkError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let id = engine.clients().register(addr);
    debug!(client = id, %addr, "client connected");

    let mut connection = ClientConnection {
        stream,
        engine: engine.clone(),
        session: Session::client(id),
        codec: QueryCodec::new(),
        buffer: BytesMut::with_capacity(read_buffer_size),
    };
    let result = connection.serve(shutdown).await;

    engine.clients().unregister(id);
    debug!(client = id, %addr, "client disconnected");
    result
}

struct ClientConnection<S> {
    stream: S,
    engine: Arc<Engine>,
    session: Session,
    codec: QueryCodec,
    buffer: BytesMut,
}

impl<S> ClientConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    async fn serve(
        &mut self,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<(), NetworkError> {
        loop {
            // Pipelined commands may already sit in the buffer.
            while let Some(command) = self.next_command().await? {
                if self.respond(&command).await? {
                    return Ok(());
                }
            }

            let read = tokio::select! {
                _ = shutdown.changed() => return Ok(()),
                read = self.stream.read_buf(&mut self.buffer) => read?,
            };
            if read == 0 {
                return self.finish().await;
            }
            trace!(bytes = read, pending = self.codec.pending_bytes(), "client read");
        }
    }

    /// Next complete command, if any. A protocol error is reported to the
    /// client and the buffered input is discarded.
    async fn next_command(&mut self) -> Result<Option<Command>, NetworkError> {
        match self.codec.decode(&mut self.buffer) {
            Ok(command) => Ok(command),
            Err(e) => {
                debug!("protocol error: {}", e);
                self.codec.reset();
                self.buffer.clear();
                self.write(&Reply::error(e.to_string())).await?;
                Ok(None)
            }
        }
    }

    /// Executes `command` and writes the reply. Returns true when the
    /// connection must close.
    async fn respond(
        &mut self,
        command: &Command,
    ) -> Result<bool, NetworkError> {
        let reply = self.engine.execute(&self.session, command);
        self.write(&reply).await?;
        Ok(reply.disconnect())
    }

    /// Runs whatever the peer sent before closing its side.
    async fn finish(&mut self) -> Result<(), NetworkError> {
        loop {
            match self.codec.decode_eof(&mut self.buffer) {
                Ok(Some(command)) => {
                    if self.respond(&command).await? {
                        return Ok(());
                    }
                }
                Ok(None) => return Ok(()),
                Err(e) => {
                    debug!("client closed mid-command: {}", e);
                    return Ok(());
                }
            }
        }
    }

    async fn write(
        &mut self,
        reply: &Reply,
    ) -> Result<(), NetworkError> {
        self.stream.write_all(&reply.encode()).await?;
        self.stream.flush().await?;
        Ok(())
    }
}
