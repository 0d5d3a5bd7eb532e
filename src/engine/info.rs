//! `info` sections. Each is a heading followed by `key:value` lines.

use super::Engine;
use crate::metrics::dropped_frames;
use crate::protocol::Reply;
use crate::PeerState;

/// Joins section lines with CRLF, including a trailing one, as a bulk reply.
pub(crate) fn render(lines: Vec<String>) -> Reply {
    Reply::bulk(format!("{}\r\n", lines.join("\r\n")))
}

fn section(
    heading: &str,
    mut fields: Vec<(String, String)>,
) -> Vec<String> {
    fields.sort();
    let mut lines = Vec::with_capacity(fields.len() + 1);
    lines.push(format!("# {}", heading));
    lines.extend(fields.into_iter().map(|(k, v)| format!("{}:{}", k, v)));
    lines
}

pub(crate) fn server(engine: &Engine) -> Vec<String> {
    let server = engine.server();
    let query_listen = server
        .query_listen
        .map(|addr| addr.to_string())
        .unwrap_or_else(|| "disabled".to_string());
    section(
        "Server",
        vec![
            ("id".into(), server.id.clone()),
            ("version".into(), server.version.to_string()),
            ("process_id".into(), std::process::id().to_string()),
            ("uptime_in_seconds".into(), server.started_at.elapsed().as_secs().to_string()),
            ("peer_listen".into(), server.peer_listen.to_string()),
            ("query_listen".into(), query_listen),
        ],
    )
}

pub(crate) fn keyspace(engine: &Engine) -> Vec<String> {
    vec![
        "# Keyspace".to_string(),
        format!("db0:keys={}", engine.keyspace().len()),
    ]
}

pub(crate) fn clients(engine: &Engine) -> Vec<String> {
    section(
        "Clients",
        vec![("connected_clients".into(), engine.clients().len().to_string())],
    )
}

pub(crate) fn wal(engine: &Engine) -> Vec<String> {
    let wal = engine.wal();
    section(
        "Wal",
        vec![
            ("current_wal_file".into(), wal.path().display().to_string()),
            ("current_wal_file_size_bytes".into(), wal.file_size().to_string()),
            ("write_bytes".into(), wal.stats().bytes_written().to_string()),
            ("write_ops".into(), wal.stats().write_ops().to_string()),
        ],
    )
}

pub(crate) fn replication(engine: &Engine) -> Vec<String> {
    let peers = engine.replicator().peers();
    let connected = peers.iter().filter(|p| p.state == PeerState::Connected).count();

    let mut fields = vec![
        ("connected_peers".to_string(), connected.to_string()),
        ("known_peers".to_string(), peers.len().to_string()),
    ];
    for peer in &peers {
        let dropped = dropped_frames(&peer.key, "inbound") + dropped_frames(&peer.key, "outbound");
        fields.push((format!("dropped_{}", peer.key), dropped.to_string()));
    }
    section("Replication", fields)
}
