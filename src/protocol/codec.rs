use bytes::Buf;
use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::protocol::command::decode;
use crate::protocol::command::Command;
use crate::protocol::command::Decoded;
use crate::ProtocolError;

/// Stream decoder for client connections.
///
/// Pipelined commands are returned one at a time. A command whose final
/// bulk payload spans several reads is held here and completed in place as
/// bytes arrive, so large values are never re-scanned.
#[derive(Debug, Default)]
pub struct QueryCodec {
    partial: Option<Command>,
}

impl QueryCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outstanding payload bytes of the command being streamed, if any
    pub fn pending_bytes(&self) -> usize {
        self.partial.as_ref().map_or(0, Command::pending_bytes)
    }

    /// Drops any half-received command, used to resync after a protocol error.
    pub fn reset(&mut self) {
        self.partial = None;
    }

    fn decode_next(
        &mut self,
        src: &mut BytesMut,
        at_eof: bool,
    ) -> Result<Option<Command>, ProtocolError> {
        if let Some(mut command) = self.partial.take() {
            let used = command.extend(&src[..])?;
            src.advance(used);
            if !command.is_complete() {
                self.partial = Some(command);
                return Ok(None);
            }
            return Ok(Some(command));
        }

        while !src.is_empty() {
            match decode(&src[..], at_eof)? {
                Decoded::Incomplete => return Ok(None),
                Decoded::Partial(command) => {
                    src.advance(src.len());
                    self.partial = Some(command);
                    return Ok(None);
                }
                Decoded::Complete(command, consumed) => {
                    src.advance(consumed);
                    // blank inline lines
                    if command.args().is_empty() {
                        continue;
                    }
                    return Ok(Some(command));
                }
            }
        }
        Ok(None)
    }
}

impl Decoder for QueryCodec {
    type Item = Command;
    type Error = ProtocolError;

    fn decode(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<Command>, ProtocolError> {
        self.decode_next(src, false)
    }

    fn decode_eof(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<Command>, ProtocolError> {
        match self.decode_next(src, true)? {
            Some(command) => Ok(Some(command)),
            None if self.partial.is_some() || !src.is_empty() => {
                self.reset();
                src.clear();
                Err(ProtocolError::Malformed("connection closed mid-frame".to_string()))
            }
            None => Ok(None),
        }
    }
}
