// -
// Wire protocol

pub(crate) const CRLF: &[u8] = b"\r\n";

/// Reply type prefixes
pub(crate) const SIMPLE_PREFIX: u8 = b'+';
pub(crate) const ERROR_PREFIX: u8 = b'-';
pub(crate) const INTEGER_PREFIX: u8 = b':';
pub(crate) const BULK_PREFIX: u8 = b'$';
pub(crate) const ARRAY_PREFIX: u8 = b'*';

pub(crate) const NULL_BULK: &[u8] = b"$-1\r\n";

// -
// Peer framing

/// Leading tag byte of a peer frame carrying a query
pub(crate) const PEER_QUERY_TAG: u8 = b'0';
/// Leading tag byte of a peer frame carrying a response
pub(crate) const PEER_RESPONSE_TAG: u8 = b'1';

/// Prefix of the correlation element inside a peer frame
pub(crate) const CORRELATION_PREFIX: &[u8] = b"id=";

pub(crate) const CORRELATION_ID_LEN: usize = 16;

// -
// Write-ahead log

pub(crate) const WAL_FILE_EXTENSION: &str = "wal";
pub(crate) const WAL_HEADER_MARKER: &str = "-WAL";
pub(crate) const WAL_CLOSED_MARKER: &[u8] = b"-CLOSED\r\n";

// -
// Keyspace

pub(crate) const DEFAULT_DB_INDEX: &str = "0";
pub(crate) const KEY_TYPE_STRING: &str = "string";
/// Reported by `ttl`; keys never expire
pub(crate) const NO_EXPIRY_TTL: i64 = -1;

pub(crate) const SCAN_DEFAULT_COUNT: usize = 10;
pub(crate) const SCAN_DEFAULT_MATCH: &str = "*";
