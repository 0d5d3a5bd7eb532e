use crate::constants::ARRAY_PREFIX;
use crate::constants::BULK_PREFIX;
use crate::constants::CRLF;
use crate::constants::ERROR_PREFIX;
use crate::constants::INTEGER_PREFIX;
use crate::constants::NULL_BULK;
use crate::constants::SIMPLE_PREFIX;
use crate::protocol::command::read_int;
use crate::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Simple,
    Bulk,
    Integer,
    Error,
    Array,
}

/// One payload element of a reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Plain bytes; bulk-encoded when the reply is an array
    Data(Vec<u8>),
    /// An already encoded nested array, embedded verbatim
    Encoded(Vec<u8>),
}

impl Segment {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Segment::Data(b) | Segment::Encoded(b) => b,
        }
    }
}

/// Result of executing a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    kind: ReplyKind,
    payload: Vec<Segment>,
    disconnect: bool,
    correlation_id: Option<String>,
}

impl Reply {
    fn single(
        kind: ReplyKind,
        data: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            kind,
            payload: vec![Segment::Data(data.into())],
            disconnect: false,
            correlation_id: None,
        }
    }

    pub fn ok() -> Self {
        Self::simple("OK")
    }

    pub fn simple(text: impl Into<Vec<u8>>) -> Self {
        Self::single(ReplyKind::Simple, text)
    }

    pub fn bulk(data: impl Into<Vec<u8>>) -> Self {
        Self::single(ReplyKind::Bulk, data)
    }

    /// Bulk reply for a missing value, encoded as `$-1`
    pub fn null() -> Self {
        Self {
            kind: ReplyKind::Bulk,
            payload: vec![],
            disconnect: false,
            correlation_id: None,
        }
    }

    pub fn integer(value: i64) -> Self {
        Self::single(ReplyKind::Integer, value.to_string())
    }

    pub fn error(message: impl Into<Vec<u8>>) -> Self {
        Self::single(ReplyKind::Error, message)
    }

    pub fn array(items: Vec<Segment>) -> Self {
        Self {
            kind: ReplyKind::Array,
            payload: items,
            disconnect: false,
            correlation_id: None,
        }
    }

    /// Array of plain byte strings
    pub fn bulk_array<I, A>(items: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<Vec<u8>>,
    {
        Self::array(items.into_iter().map(|i| Segment::Data(i.into())).collect())
    }

    /// Sets the flag that makes the connection close after this reply
    pub fn with_disconnect(mut self) -> Self {
        self.disconnect = true;
        self
    }

    pub fn with_correlation_id(
        mut self,
        id: impl Into<String>,
    ) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn kind(&self) -> ReplyKind {
        self.kind
    }

    pub fn payload(&self) -> &[Segment] {
        &self.payload
    }

    pub fn is_null(&self) -> bool {
        self.kind == ReplyKind::Bulk && self.payload.is_empty()
    }

    pub fn is_error(&self) -> bool {
        self.kind == ReplyKind::Error
    }

    pub fn disconnect(&self) -> bool {
        self.disconnect
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// First payload element as UTF-8 text, lossily
    pub fn text(&self) -> String {
        self.payload
            .first()
            .map(|s| String::from_utf8_lossy(s.as_bytes()).into_owned())
            .unwrap_or_default()
    }

    /// Wire encoding
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match (self.kind, self.payload.as_slice()) {
            (ReplyKind::Bulk, []) => out.extend_from_slice(NULL_BULK),
            (ReplyKind::Array, items) => encode_array(&mut out, items),
            (kind, [single]) => {
                let data = single.as_bytes();
                match kind {
                    ReplyKind::Bulk => encode_bulk(&mut out, data),
                    ReplyKind::Integer => encode_line(&mut out, INTEGER_PREFIX, data),
                    ReplyKind::Error => encode_line(&mut out, ERROR_PREFIX, data),
                    _ => encode_line(&mut out, SIMPLE_PREFIX, data),
                }
            }
            (_, items) => encode_array(&mut out, items),
        }
        out
    }

    /// Parses one encoded reply, as carried in peer response frames.
    pub fn decode(data: &[u8]) -> Result<Reply, ProtocolError> {
        let (reply, _) = decode_at(data, 0)?;
        Ok(reply)
    }
}

fn encode_line(
    out: &mut Vec<u8>,
    prefix: u8,
    data: &[u8],
) {
    out.push(prefix);
    out.extend_from_slice(data);
    out.extend_from_slice(CRLF);
}

fn encode_bulk(
    out: &mut Vec<u8>,
    data: &[u8],
) {
    out.push(BULK_PREFIX);
    out.extend_from_slice(data.len().to_string().as_bytes());
    out.extend_from_slice(CRLF);
    out.extend_from_slice(data);
    out.extend_from_slice(CRLF);
}

fn encode_array(
    out: &mut Vec<u8>,
    items: &[Segment],
) {
    out.push(ARRAY_PREFIX);
    out.extend_from_slice(items.len().to_string().as_bytes());
    out.extend_from_slice(CRLF);
    for item in items {
        match item {
            Segment::Data(data) => encode_bulk(out, data),
            Segment::Encoded(nested) => out.extend_from_slice(nested),
        }
    }
}

fn read_line(
    data: &[u8],
    cursor: usize,
) -> Result<(&[u8], usize), ProtocolError> {
    let rest = data.get(cursor..).unwrap_or_default();
    let end = rest
        .windows(2)
        .position(|w| w == CRLF)
        .ok_or_else(|| ProtocolError::Malformed("unterminated reply line".to_string()))?;
    Ok((&rest[..end], cursor + end + CRLF.len()))
}

fn decode_at(
    data: &[u8],
    cursor: usize,
) -> Result<(Reply, usize), ProtocolError> {
    let prefix = *data
        .get(cursor)
        .ok_or_else(|| ProtocolError::Malformed("empty reply".to_string()))?;
    match prefix {
        SIMPLE_PREFIX => read_line(data, cursor + 1).map(|(l, next)| (Reply::simple(l), next)),
        ERROR_PREFIX => read_line(data, cursor + 1).map(|(l, next)| (Reply::error(l), next)),
        INTEGER_PREFIX => read_line(data, cursor + 1)
            .map(|(l, next)| (Reply::single(ReplyKind::Integer, l), next)),
        BULK_PREFIX => {
            let (len, start) = read_int(data, cursor + 1)?
                .ok_or_else(|| ProtocolError::Malformed("unterminated bulk header".to_string()))?;
            if len < 0 {
                return Ok((Reply::null(), start));
            }
            let end = start + len as usize;
            if data.len() < end + CRLF.len() {
                return Err(ProtocolError::Malformed("truncated bulk reply".to_string()));
            }
            Ok((Reply::bulk(&data[start..end]), end + CRLF.len()))
        }
        ARRAY_PREFIX => {
            let (count, mut next) = read_int(data, cursor + 1)?
                .ok_or_else(|| ProtocolError::Malformed("unterminated array header".to_string()))?;
            let mut items = Vec::with_capacity(count.clamp(0, 64) as usize);
            for _ in 0..count.max(0) {
                let start = next;
                let (item, after) = decode_at(data, start)?;
                if item.kind == ReplyKind::Array {
                    items.push(Segment::Encoded(data[start..after].to_vec()));
                } else {
                    let bytes = item.payload.first().map(|s| s.as_bytes().to_vec());
                    items.push(Segment::Data(bytes.unwrap_or_default()));
                }
                next = after;
            }
            Ok((Reply::array(items), next))
        }
        other => Err(ProtocolError::Malformed(format!(
            "unknown reply prefix '{}'",
            char::from(other)
        ))),
    }
}
