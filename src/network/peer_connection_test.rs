use std::sync::Arc;
use std::time::Duration;

use futures::SinkExt;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::io::DuplexStream;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

use super::run_peer_connection;
use crate::protocol::encode_args;
use crate::protocol::FrameKind;
use crate::protocol::PeerCodec;
use crate::protocol::PeerFrame;
use crate::protocol::Reply;
use crate::test_utils::quiet_replicator;
use crate::test_utils::test_engine;
use crate::test_utils::TestEngine;
use crate::MeshConfig;
use crate::MockReplicator;
use crate::PeerDirection;
use crate::PeerNode;
use crate::PeerState;

const WAIT: Duration = Duration::from_secs(5);

fn config() -> MeshConfig {
    MeshConfig {
        workers_per_peer: 2,
        inbound_queue_capacity: 16,
        outbound_queue_capacity: 16,
        query_timeout_ms: 2000,
        ..Default::default()
    }
}

async fn wait_until(cond: impl Fn() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

fn spawn_side(
    stream: DuplexStream,
    key: &str,
    node: &TestEngine,
) -> (Arc<PeerNode>, JoinHandle<()>) {
    let peer = Arc::new(PeerNode::new(key, PeerDirection::Outbound));
    let handle = tokio::spawn(run_peer_connection(
        stream,
        peer.clone(),
        node.engine.clone(),
        config(),
    ));
    (peer, handle)
}

/// Two engines joined by an in-memory connection. `b_on_a` is how node A
/// sees node B.
struct Pair {
    a: TestEngine,
    b: TestEngine,
    b_on_a: Arc<PeerNode>,
    a_on_b: Arc<PeerNode>,
    a_task: JoinHandle<()>,
    b_task: JoinHandle<()>,
}

async fn pair_with(replicator_b: Arc<MockReplicator>) -> Pair {
    let a = test_engine("node-a", quiet_replicator()).await;
    let b = test_engine("node-b", replicator_b).await;
    let (a_end, b_end) = tokio::io::duplex(64 * 1024);
    let (b_on_a, a_task) = spawn_side(a_end, "node-b:4301", &a);
    let (a_on_b, b_task) = spawn_side(b_end, "node-a:4301", &b);
    Pair {
        a,
        b,
        b_on_a,
        a_on_b,
        a_task,
        b_task,
    }
}

async fn pair() -> Pair {
    pair_with(quiet_replicator()).await
}

#[tokio::test]
async fn test_both_sides_learn_remote_identity() {
    let pair = pair().await;

    wait_until(|| {
        pair.b_on_a.state() == PeerState::Connected && pair.a_on_b.state() == PeerState::Connected
    })
    .await;

    assert_eq!(pair.b_on_a.id().unwrap().as_str(), "node-b");
    assert_eq!(pair.a_on_b.id().unwrap().as_str(), "node-a");
}

#[tokio::test]
async fn test_query_is_executed_remotely_and_correlated() {
    let pair = pair().await;
    pair.b.keyspace.set(b"k", b"remote value");

    let reply = pair
        .b_on_a
        .query(&encode_args(&["get", "k"]), Duration::from_secs(2))
        .await
        .unwrap();

    assert_eq!(reply.encode(), b"$12\r\nremote value\r\n".to_vec());
    assert_eq!(pair.b_on_a.waiting_len(), 0);
}

#[tokio::test]
async fn test_concurrent_queries_get_their_own_replies() {
    let pair = pair().await;
    for i in 0..20 {
        pair.b.keyspace.set(format!("k{}", i).as_bytes(), format!("v{}", i).as_bytes());
    }

    let queries = (0..20).map(|i| {
        let peer = pair.b_on_a.clone();
        async move {
            let reply = peer
                .query(&encode_args(&["get".to_string(), format!("k{}", i)]), Duration::from_secs(2))
                .await
                .unwrap();
            (i, reply.text())
        }
    });
    let replies = futures::future::join_all(queries).await;

    for (i, text) in replies {
        assert_eq!(text, format!("v{}", i));
    }
}

#[tokio::test]
async fn test_replicated_write_is_applied_and_logged_but_not_rebroadcast() {
    let mut replicator = MockReplicator::new();
    replicator.expect_broadcast().never();
    let pair = pair_with(Arc::new(replicator)).await;
    let ops_before = pair.b.wal.stats().write_ops();

    pair.b_on_a
        .enqueue_query(PeerFrame::query("bcast-1", b"incr a\r\n"))
        .unwrap();

    wait_until(|| pair.b.keyspace.get(b"a").is_some()).await;
    assert_eq!(pair.b.keyspace.get(b"a"), Some(b"1".to_vec()));
    wait_until(|| pair.b.wal.stats().write_ops() == ops_before + 1).await;
    // the reply to an uncorrelated broadcast finds no waiter on A
    assert_eq!(pair.b_on_a.waiting_len(), 0);
}

#[tokio::test]
async fn test_traffic_is_accounted() {
    let pair = pair().await;
    wait_until(|| pair.b_on_a.id().is_some() && pair.a_on_b.id().is_some()).await;

    let a_stats = pair.b_on_a.stats();
    let b_stats = pair.a_on_b.stats();
    assert!(a_stats.bytes_out() > 0);
    assert!(a_stats.bytes_in() > 0);
    wait_until(|| a_stats.bytes_out() == b_stats.bytes_in()).await;
}

#[tokio::test]
async fn test_removal_tears_the_connection_down() {
    let pair = pair().await;
    wait_until(|| pair.b_on_a.state() == PeerState::Connected).await;

    pair.b_on_a.remove();

    tokio::time::timeout(WAIT, pair.a_task).await.unwrap().unwrap();
    assert_eq!(pair.b_on_a.state(), PeerState::NoConnection);
    // B sees its socket close
    tokio::time::timeout(WAIT, pair.b_task).await.unwrap().unwrap();
    assert_eq!(pair.a_on_b.state(), PeerState::NoConnection);
    assert!(pair.a_on_b.stats().failures() >= 1);
}

#[tokio::test]
async fn test_first_frame_is_identity_query() {
    let node = test_engine("node-a", quiet_replicator()).await;
    let (local, remote) = tokio::io::duplex(4096);
    let (peer, _task) = spawn_side(local, "remote:4301", &node);
    let mut remote = Framed::new(remote, PeerCodec::default());

    let frame = tokio::time::timeout(WAIT, remote.next()).await.unwrap().unwrap().unwrap();

    assert_eq!(frame.kind, FrameKind::Query);
    assert_eq!(frame.payload, encode_args(&["peer", "id"]));
    assert_eq!(peer.state(), PeerState::Connecting);

    remote
        .send(PeerFrame::response(frame.correlation_id, &Reply::bulk("remote-id")))
        .await
        .unwrap();
    wait_until(|| peer.state() == PeerState::Connected).await;
    assert_eq!(peer.id().unwrap().as_str(), "remote-id");
}

#[tokio::test]
async fn test_link_without_identity_still_goes_into_service() {
    let node = test_engine("node-a", quiet_replicator()).await;
    let (local, remote) = tokio::io::duplex(4096);
    let peer = Arc::new(PeerNode::new("silent:4301", PeerDirection::Inbound));
    let config = MeshConfig {
        query_timeout_ms: 50,
        ..config()
    };
    let _task = tokio::spawn(run_peer_connection(local, peer.clone(), node.engine.clone(), config));
    let _remote = remote;

    wait_until(|| peer.state() == PeerState::Connected).await;
    assert!(peer.id().is_none());
}

#[tokio::test]
async fn test_garbage_from_remote_counts_as_failure() {
    let node = test_engine("node-a", quiet_replicator()).await;
    let (local, mut remote) = tokio::io::duplex(4096);
    let (peer, task) = spawn_side(local, "remote:4301", &node);
    // the identity query is outstanding once the link is up
    wait_until(|| peer.waiting_len() == 1).await;

    remote.write_all(b"9\r\n*2\r\n").await.unwrap();

    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    assert_eq!(peer.state(), PeerState::NoConnection);
    assert_eq!(peer.stats().failures(), 1);
}
