use super::*;
use crate::ProtocolError;

#[test]
fn test_parse_array_form() {
    let cmd = parse(b"*3\r\n$3\r\nset\r\n$3\r\nkey\r\n$4\r\n1337\r\n").unwrap();

    assert_eq!(cmd.args(), &[b"set".to_vec(), b"key".to_vec(), b"1337".to_vec()]);
    assert!(cmd.is_complete());
    assert_eq!(cmd.pending_bytes(), 0);
    assert_eq!(cmd.verb().as_deref(), Some("set"));
}

#[test]
fn test_parse_inline_form_trims_line_endings() {
    let cmd = parse(b"peer connect 192.168.0.2:4301\r\n").unwrap();

    assert_eq!(
        cmd.args(),
        &[b"peer".to_vec(), b"connect".to_vec(), b"192.168.0.2:4301".to_vec()]
    );
    assert_eq!(cmd.raw(), b"peer connect 192.168.0.2:4301\r\n");
}

#[test]
fn test_parse_inline_without_terminator() {
    let cmd = parse(b"incr key").unwrap();
    assert_eq!(cmd.args(), &[b"incr".to_vec(), b"key".to_vec()]);
}

#[test]
fn test_parse_inline_skips_repeated_spaces() {
    let cmd = parse(b"del  a   b\n").unwrap();
    assert_eq!(cmd.args(), &[b"del".to_vec(), b"a".to_vec(), b"b".to_vec()]);
}

#[test]
fn test_verb_is_lowercased() {
    let cmd = parse(b"PING\r\n").unwrap();
    assert_eq!(cmd.verb().as_deref(), Some("ping"));
}

#[test]
fn test_partial_bulk_sets_pending_bytes() {
    let cmd = parse(b"*3\r\n$3\r\nset\r\n$1\r\nk\r\n$10\r\n0123").unwrap();

    assert!(!cmd.is_complete());
    assert_eq!(cmd.pending_bytes(), 6);
    assert_eq!(cmd.args()[2], b"0123".to_vec());
}

#[test]
fn test_extend_completes_partial_bulk_and_leaves_trailing_bytes() {
    let mut cmd = parse(b"*3\r\n$3\r\nset\r\n$1\r\nk\r\n$10\r\n0123").unwrap();

    let used = cmd.extend(b"45").unwrap();
    assert_eq!(used, 2);
    assert_eq!(cmd.pending_bytes(), 4);

    let used = cmd.extend(b"6789\r\n*1\r\n$4\r\nping\r\n").unwrap();
    assert_eq!(used, 6);
    assert!(cmd.is_complete());
    assert_eq!(cmd.args()[2], b"0123456789".to_vec());
    assert_eq!(cmd.raw(), b"*3\r\n$3\r\nset\r\n$1\r\nk\r\n$10\r\n0123456789\r\n");
}

#[test]
fn test_extend_handles_split_terminator() {
    let mut cmd = parse(b"*1\r\n$4\r\nping\r").unwrap();
    assert_eq!(cmd.pending_bytes(), 0);
    assert!(!cmd.is_complete());

    assert_eq!(cmd.extend(b"\n").unwrap(), 1);
    assert!(cmd.is_complete());
}

#[test]
fn test_extend_rejects_missing_terminator() {
    let mut cmd = parse(b"*1\r\n$4\r\npi").unwrap();
    let result = cmd.extend(b"ngXX");
    assert!(matches!(result, Err(ProtocolError::Malformed(_))));
}

#[test]
fn test_binary_value_survives_round_trip() {
    let value: Vec<u8> = (0u8..=255).chain(b"\r\n*3\r\n$".iter().copied()).collect();
    let bytes = encode_args(&[b"set".as_slice(), b"blob".as_slice(), value.as_slice()]);

    let cmd = parse(&bytes).unwrap();

    assert_eq!(cmd.args()[2], value);
    assert_eq!(cmd.encode(), bytes);
}

#[test]
fn test_truncated_header_is_protocol_error() {
    assert!(matches!(parse(b"*2\r"), Err(ProtocolError::Malformed(_))));
    assert!(matches!(parse(b"*2\r\n$3"), Err(ProtocolError::Malformed(_))));
}

#[test]
fn test_invalid_length_header() {
    assert!(matches!(
        parse(b"*1\r\n$abc\r\nxyz\r\n"),
        Err(ProtocolError::InvalidLength(_))
    ));
    assert!(matches!(parse(b"*x\r\n"), Err(ProtocolError::InvalidLength(_))));
}

#[test]
fn test_element_without_bulk_marker() {
    assert!(matches!(
        parse(b"*1\r\n:3\r\nabc\r\n"),
        Err(ProtocolError::Malformed(_))
    ));
}

#[test]
fn test_bad_terminator_after_payload() {
    assert!(matches!(
        parse(b"*1\r\n$3\r\nabcXY"),
        Err(ProtocolError::Malformed(_))
    ));
}

#[test]
fn test_decode_reports_incomplete_for_non_final_element() {
    let result = decode(b"*2\r\n$3\r\nse", false).unwrap();
    assert!(matches!(result, Decoded::Incomplete));
}

#[test]
fn test_decode_inline_waits_for_newline() {
    assert!(matches!(decode(b"get ke", false).unwrap(), Decoded::Incomplete));
    match decode(b"get key\r\nping\r\n", false).unwrap() {
        Decoded::Complete(cmd, consumed) => {
            assert_eq!(consumed, 9);
            assert_eq!(cmd.args(), &[b"get".to_vec(), b"key".to_vec()]);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_read_int() {
    assert_eq!(read_int(b"$12\r\n", 1).unwrap(), Some((12, 5)));
    assert_eq!(read_int(b"$-1\r\n", 1).unwrap(), Some((-1, 5)));
    assert_eq!(read_int(b"$12", 1).unwrap(), None);
}

#[test]
fn test_correlation_ids_are_unique() {
    let a = parse(b"ping").unwrap();
    let b = parse(b"ping").unwrap();
    assert_ne!(a.id(), b.id());
    assert!(!a.id().is_empty());
}

#[test]
fn test_from_args_produces_array_raw_bytes() {
    let cmd = Command::from_args(["peer", "id"]);
    assert_eq!(cmd.raw(), b"*2\r\n$4\r\npeer\r\n$2\r\nid\r\n");
}
