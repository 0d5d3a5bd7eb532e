//! Parsing of client commands.
//!
//! Two input shapes are accepted:
//! - array form: `*<N>\r\n` followed by N `$<len>\r\n<bytes>\r\n` elements,
//!   binary safe;
//! - inline form: anything not starting with `*`, split on spaces.
//!
//! When the payload of the final bulk element has not fully arrived the
//! parser returns a partial [`Command`] holding what is available. The
//! remaining bytes are fed through [`Command::extend`] until
//! [`Command::is_complete`].

use nanoid::nanoid;

use crate::constants::ARRAY_PREFIX;
use crate::constants::BULK_PREFIX;
use crate::constants::CORRELATION_ID_LEN;
use crate::constants::CRLF;
use crate::ProtocolError;

/// Longest accepted `*<N>` / `$<len>` header line, terminator excluded
const MAX_HEADER_LEN: usize = 20;
const MAX_ARGS: i64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Command {
    raw: Vec<u8>,
    id: String,
    args: Vec<Vec<u8>>,
    /// Payload bytes of the last argument still to arrive
    pending_bytes: usize,
    /// Bytes of the CRLF closing the last argument still to arrive
    pending_trailer: usize,
}

/// Outcome of decoding a prefix of a byte stream.
#[derive(Debug)]
pub enum Decoded {
    /// A whole command built from the first `usize` bytes of the input
    Complete(Command, usize),
    /// The final bulk payload is still arriving. All input bytes belong to
    /// this command; feed the rest through [`Command::extend`].
    Partial(Command),
    /// A header, or an element before the last one, is cut short. Retry with
    /// more bytes from the same starting point.
    Incomplete,
}

/// Parses one command from `data`, which is treated as everything received
/// so far. A truncated header is a protocol error here; an incomplete final
/// payload yields a command with [`Command::pending_bytes`] > 0.
pub fn parse(data: &[u8]) -> Result<Command, ProtocolError> {
    match decode(data, true)? {
        Decoded::Complete(cmd, _) | Decoded::Partial(cmd) => Ok(cmd),
        Decoded::Incomplete => Err(ProtocolError::Malformed("truncated frame header".to_string())),
    }
}

/// Decodes the first command in `data`.
///
/// With `at_eof` false an inline command needs its line terminator; with
/// `at_eof` true the whole input is taken as the line.
pub fn decode(
    data: &[u8],
    at_eof: bool,
) -> Result<Decoded, ProtocolError> {
    if data.first() == Some(&ARRAY_PREFIX) {
        decode_array(data)
    } else {
        Ok(decode_inline(data, at_eof))
    }
}

/// Reads a decimal integer starting at `cursor` up to the next CRLF.
///
/// Returns `None` when no terminator is found yet, otherwise the value and
/// the cursor just past the terminator.
pub(crate) fn read_int(
    data: &[u8],
    cursor: usize,
) -> Result<Option<(i64, usize)>, ProtocolError> {
    let rest = data.get(cursor..).unwrap_or_default();
    let end = match rest.windows(2).position(|w| w == CRLF) {
        Some(end) => end,
        None => {
            if rest.len() > MAX_HEADER_LEN + 1 {
                return Err(ProtocolError::InvalidLength(
                    String::from_utf8_lossy(&rest[..MAX_HEADER_LEN]).into_owned(),
                ));
            }
            return Ok(None);
        }
    };
    let digits = &rest[..end];
    let value = std::str::from_utf8(digits)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| ProtocolError::InvalidLength(String::from_utf8_lossy(digits).into_owned()))?;
    Ok(Some((value, cursor + end + CRLF.len())))
}

fn decode_array(data: &[u8]) -> Result<Decoded, ProtocolError> {
    let (count, mut cursor) = match read_int(data, 1)? {
        Some(header) => header,
        None => return Ok(Decoded::Incomplete),
    };
    if !(0..=MAX_ARGS).contains(&count) {
        return Err(ProtocolError::Malformed(format!("invalid multibulk length {}", count)));
    }
    let count = count as usize;

    let mut args = Vec::with_capacity(count.min(64));
    for index in 0..count {
        match data.get(cursor) {
            None => return Ok(Decoded::Incomplete),
            Some(&BULK_PREFIX) => {}
            Some(other) => {
                return Err(ProtocolError::Malformed(format!(
                    "expected '$', got '{}'",
                    char::from(*other)
                )))
            }
        }
        let (len, next) = match read_int(data, cursor + 1)? {
            Some(header) => header,
            None => return Ok(Decoded::Incomplete),
        };
        if len < 0 {
            return Err(ProtocolError::InvalidLength(len.to_string()));
        }
        let len = len as usize;
        cursor = next;

        let available = data.len() - cursor;
        if available < len + CRLF.len() {
            if index + 1 < count {
                return Ok(Decoded::Incomplete);
            }
            // Final element: keep what is here and let the caller stream the rest.
            let have = available.min(len);
            let trailer_have = available - have;
            if trailer_have == 1 && data[cursor + len] != CRLF[0] {
                return Err(ProtocolError::Malformed("missing CRLF after bulk payload".to_string()));
            }
            args.push(data[cursor..cursor + have].to_vec());
            return Ok(Decoded::Partial(Command {
                raw: data.to_vec(),
                id: new_correlation_id(),
                args,
                pending_bytes: len - have,
                pending_trailer: CRLF.len() - trailer_have,
            }));
        }

        if &data[cursor + len..cursor + len + CRLF.len()] != CRLF {
            return Err(ProtocolError::Malformed("missing CRLF after bulk payload".to_string()));
        }
        args.push(data[cursor..cursor + len].to_vec());
        cursor += len + CRLF.len();
    }

    Ok(Decoded::Complete(
        Command {
            raw: data[..cursor].to_vec(),
            id: new_correlation_id(),
            args,
            pending_bytes: 0,
            pending_trailer: 0,
        },
        cursor,
    ))
}

fn decode_inline(
    data: &[u8],
    at_eof: bool,
) -> Decoded {
    let consumed = match data.iter().position(|b| *b == b'\n') {
        Some(newline) => newline + 1,
        None if at_eof => data.len(),
        None => return Decoded::Incomplete,
    };
    let line = &data[..consumed];
    let args = line
        .split(|b| *b == b' ')
        .map(trim_line_endings)
        .filter(|token| !token.is_empty())
        .map(<[u8]>::to_vec)
        .collect();

    Decoded::Complete(
        Command {
            raw: line.to_vec(),
            id: new_correlation_id(),
            args,
            pending_bytes: 0,
            pending_trailer: 0,
        },
        consumed,
    )
}

fn trim_line_endings(token: &[u8]) -> &[u8] {
    let is_eol = |b: &u8| *b == b'\r' || *b == b'\n';
    let start = token.iter().position(|b| !is_eol(b)).unwrap_or(token.len());
    let end = token.iter().rposition(|b| !is_eol(b)).map_or(start, |p| p + 1);
    &token[start..end]
}

fn new_correlation_id() -> String {
    nanoid!(CORRELATION_ID_LEN)
}

impl Command {
    /// Builds a command from arguments, with array-form raw bytes.
    pub fn from_args<I, A>(args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        let args: Vec<Vec<u8>> = args.into_iter().map(|a| a.as_ref().to_vec()).collect();
        let raw = encode_args(&args);
        Self {
            raw,
            id: new_correlation_id(),
            args,
            pending_bytes: 0,
            pending_trailer: 0,
        }
    }

    /// Appends newly arrived bytes to the last argument.
    ///
    /// Returns how many bytes of `chunk` were used; bytes past the end of the
    /// frame are left for the next command.
    pub fn extend(
        &mut self,
        chunk: &[u8],
    ) -> Result<usize, ProtocolError> {
        let mut used = 0;
        if self.pending_bytes > 0 {
            let n = self.pending_bytes.min(chunk.len());
            if let Some(last) = self.args.last_mut() {
                last.extend_from_slice(&chunk[..n]);
            }
            self.raw.extend_from_slice(&chunk[..n]);
            self.pending_bytes -= n;
            used = n;
        }
        while self.pending_bytes == 0 && self.pending_trailer > 0 && used < chunk.len() {
            let expected = CRLF[CRLF.len() - self.pending_trailer];
            if chunk[used] != expected {
                return Err(ProtocolError::Malformed("missing CRLF after bulk payload".to_string()));
            }
            self.raw.push(chunk[used]);
            self.pending_trailer -= 1;
            used += 1;
        }
        Ok(used)
    }

    pub fn is_complete(&self) -> bool {
        self.pending_bytes == 0 && self.pending_trailer == 0
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes
    }

    /// Bytes still missing before the frame is complete, terminator included
    pub fn missing_bytes(&self) -> usize {
        self.pending_bytes + self.pending_trailer
    }

    /// Correlation identifier, unique per parse
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn args(&self) -> &[Vec<u8>] {
        &self.args
    }

    pub fn into_args(self) -> Vec<Vec<u8>> {
        self.args
    }

    /// The bytes exactly as received
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// First argument, lowercased
    pub fn verb(&self) -> Option<String> {
        self.args
            .first()
            .map(|v| String::from_utf8_lossy(v).to_ascii_lowercase())
    }

    /// Array/bulk serialization of the arguments
    pub fn encode(&self) -> Vec<u8> {
        encode_args(&self.args)
    }
}

pub(crate) fn encode_args<A: AsRef<[u8]>>(args: &[A]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + args.iter().map(|a| a.as_ref().len() + 16).sum::<usize>());
    out.push(ARRAY_PREFIX);
    out.extend_from_slice(args.len().to_string().as_bytes());
    out.extend_from_slice(CRLF);
    for arg in args {
        let arg = arg.as_ref();
        out.push(BULK_PREFIX);
        out.extend_from_slice(arg.len().to_string().as_bytes());
        out.extend_from_slice(CRLF);
        out.extend_from_slice(arg);
        out.extend_from_slice(CRLF);
    }
    out
}
