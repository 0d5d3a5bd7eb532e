use bytes::BytesMut;
use tokio_util::codec::Decoder;
use tokio_util::codec::Encoder;

use super::*;
use crate::ProtocolError;

#[test]
fn test_response_frame_encoding() {
    let frame = PeerFrame::response("foo", &Reply::simple("PONG"));

    assert_eq!(frame.encode(), b"1\r\n*2\r\n$6\r\nid=foo\r\n$7\r\n+PONG\r\n\r\n".to_vec());
    assert_eq!(frame.wire_len(), frame.encode().len());
}

#[test]
fn test_query_frame_encoding() {
    let frame = PeerFrame::query("abc", b"incr a\r\n");

    assert_eq!(frame.encode(), b"0\r\n*2\r\n$6\r\nid=abc\r\n$8\r\nincr a\r\n\r\n".to_vec());
    assert_eq!(frame.wire_len(), frame.encode().len());
}

#[test]
fn test_codec_decodes_back_to_back_frames() {
    let query = PeerFrame::query("q1", b"*2\r\n$3\r\nget\r\n$1\r\na\r\n");
    let response = PeerFrame::response("r1", &Reply::bulk("1"));
    let mut buf = BytesMut::new();
    let mut codec = PeerCodec::default();
    codec.encode(query.clone(), &mut buf).unwrap();
    codec.encode(response.clone(), &mut buf).unwrap();

    assert_eq!(codec.decode(&mut buf).unwrap(), Some(query));
    assert_eq!(codec.decode(&mut buf).unwrap(), Some(response));
    assert_eq!(codec.decode(&mut buf).unwrap(), None);
}

#[test]
fn test_codec_waits_for_split_frame() {
    let frame = PeerFrame::query("split", &vec![7u8; 5000]);
    let bytes = frame.encode();

    for split in [1, 2, 3, 5, 20, 100, 4000, bytes.len() - 1] {
        let mut codec = PeerCodec::default();
        let mut buf = BytesMut::from(&bytes[..split]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None, "split at {}", split);

        buf.extend_from_slice(&bytes[split..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(frame.clone()), "split at {}", split);
        assert!(buf.is_empty());
    }
}

#[test]
fn test_codec_rejects_unknown_tag() {
    let mut codec = PeerCodec::default();
    let mut buf = BytesMut::from(&b"7\r\n*2\r\n"[..]);

    assert!(matches!(codec.decode(&mut buf), Err(ProtocolError::UnknownFrameTag(b'7'))));
}

#[test]
fn test_codec_rejects_frame_without_correlation_id() {
    let mut codec = PeerCodec::default();
    let mut buf = BytesMut::from(&b"0\r\n*2\r\n$3\r\nfoo\r\n$4\r\nping\r\n"[..]);

    assert!(matches!(codec.decode(&mut buf), Err(ProtocolError::Malformed(_))));
}

#[test]
fn test_codec_rejects_wrong_element_count() {
    let mut codec = PeerCodec::default();
    let mut buf = BytesMut::from(&b"1\r\n*1\r\n$5\r\nid=zz\r\n"[..]);

    assert!(matches!(codec.decode(&mut buf), Err(ProtocolError::Malformed(_))));
}
