//! Framing of peer traffic.
//!
//! A single TCP connection between two nodes carries both queries and
//! responses. Every frame is a tag byte (`0` query, `1` response), a CRLF,
//! and a 2-element array: `id=<correlation id>` and the payload (raw client
//! command bytes for queries, encoded reply bytes for responses).

use bytes::Buf;
use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tokio_util::codec::Encoder;

use crate::constants::ARRAY_PREFIX;
use crate::constants::CORRELATION_PREFIX;
use crate::constants::CRLF;
use crate::constants::PEER_QUERY_TAG;
use crate::constants::PEER_RESPONSE_TAG;
use crate::protocol::command::decode;
use crate::protocol::command::encode_args;
use crate::protocol::command::Decoded;
use crate::protocol::reply::Reply;
use crate::ProtocolError;

const FRAME_PREAMBLE_LEN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Query,
    Response,
}

impl FrameKind {
    fn tag(self) -> u8 {
        match self {
            FrameKind::Query => PEER_QUERY_TAG,
            FrameKind::Response => PEER_RESPONSE_TAG,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FrameKind::Query => "query",
            FrameKind::Response => "response",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerFrame {
    pub kind: FrameKind,
    pub correlation_id: String,
    pub payload: Vec<u8>,
}

impl PeerFrame {
    pub fn query(
        correlation_id: impl Into<String>,
        raw: &[u8],
    ) -> Self {
        Self {
            kind: FrameKind::Query,
            correlation_id: correlation_id.into(),
            payload: raw.to_vec(),
        }
    }

    pub fn response(
        correlation_id: impl Into<String>,
        reply: &Reply,
    ) -> Self {
        Self {
            kind: FrameKind::Response,
            correlation_id: correlation_id.into(),
            payload: reply.encode(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut id = CORRELATION_PREFIX.to_vec();
        id.extend_from_slice(self.correlation_id.as_bytes());
        let body = encode_args(&[id.as_slice(), self.payload.as_slice()]);

        let mut out = Vec::with_capacity(FRAME_PREAMBLE_LEN + body.len());
        out.push(self.kind.tag());
        out.extend_from_slice(CRLF);
        out.extend_from_slice(&body);
        out
    }

    /// Encoded length on the wire
    pub fn wire_len(&self) -> usize {
        // tag + CRLF + "*2\r\n" + two bulk headers
        let id_len = CORRELATION_PREFIX.len() + self.correlation_id.len();
        FRAME_PREAMBLE_LEN
            + 4
            + bulk_len(id_len)
            + bulk_len(self.payload.len())
    }
}

fn bulk_len(len: usize) -> usize {
    1 + len.to_string().len() + CRLF.len() + len + CRLF.len()
}

/// Stream codec for peer connections.
#[derive(Debug, Default)]
pub struct PeerCodec {
    /// Buffer length below which decoding cannot succeed yet
    awaiting: usize,
}

impl Decoder for PeerCodec {
    type Item = PeerFrame;
    type Error = ProtocolError;

    fn decode(
        &mut self,
        src: &mut BytesMut,
    ) -> Result<Option<PeerFrame>, ProtocolError> {
        if src.len() < FRAME_PREAMBLE_LEN.max(self.awaiting) {
            return Ok(None);
        }

        let kind = match src[0] {
            PEER_QUERY_TAG => FrameKind::Query,
            PEER_RESPONSE_TAG => FrameKind::Response,
            other => return Err(ProtocolError::UnknownFrameTag(other)),
        };
        if &src[1..FRAME_PREAMBLE_LEN] != CRLF {
            return Err(ProtocolError::Malformed("missing delimiter after frame tag".to_string()));
        }
        match src.get(FRAME_PREAMBLE_LEN) {
            None => return Ok(None),
            Some(&ARRAY_PREFIX) => {}
            Some(_) => return Err(ProtocolError::Malformed("peer frame body is not an array".to_string())),
        }

        let (command, consumed) = match decode(&src[FRAME_PREAMBLE_LEN..], false)? {
            Decoded::Complete(command, consumed) => (command, consumed),
            Decoded::Partial(command) => {
                self.awaiting = src.len() + command.missing_bytes();
                src.reserve(command.missing_bytes());
                return Ok(None);
            }
            Decoded::Incomplete => return Ok(None),
        };
        self.awaiting = 0;
        src.advance(FRAME_PREAMBLE_LEN + consumed);

        let [id, payload]: [Vec<u8>; 2] = command
            .into_args()
            .try_into()
            .map_err(|_| ProtocolError::Malformed("peer frame must carry exactly 2 elements".to_string()))?;
        let correlation_id = id
            .strip_prefix(CORRELATION_PREFIX)
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .ok_or_else(|| ProtocolError::Malformed("peer frame without correlation id".to_string()))?;

        Ok(Some(PeerFrame {
            kind,
            correlation_id,
            payload,
        }))
    }
}

impl Encoder<PeerFrame> for PeerCodec {
    type Error = ProtocolError;

    fn encode(
        &mut self,
        frame: PeerFrame,
        dst: &mut BytesMut,
    ) -> Result<(), ProtocolError> {
        dst.extend_from_slice(&frame.encode());
        Ok(())
    }
}
