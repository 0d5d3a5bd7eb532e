use std::time::Duration;

use crate::commons::start_node;
use crate::commons::wait_until;
use crate::commons::TestClient;

#[tokio::test]
async fn test_writes_replicate_in_both_directions() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let a = start_node("node-a", dir_a.path()).await.unwrap();
    let b = start_node("node-b", dir_b.path()).await.unwrap();
    let mut client_a = TestClient::connect(a.query_addr()).await;
    let mut client_b = TestClient::connect(b.query_addr()).await;

    client_a
        .call(&format!("PEER CONNECT {}", b.peer_addr()), b"+OK\r\n")
        .await;
    wait_until(|| a.node.mesh().connected_len() == 1 && b.node.mesh().connected_len() == 1).await;

    client_a.call("INCR a", b":1\r\n").await;
    wait_until(|| b.node.engine().keyspace().get(b"a") == Some(b"1".to_vec())).await;
    client_b.call("GET a", b"$1\r\n1\r\n").await;

    client_b.call("SET b from-b", b"+OK\r\n").await;
    wait_until(|| a.node.engine().keyspace().get(b"b").is_some()).await;
    client_a.call("GET b", b"$6\r\nfrom-b\r\n").await;

    // a replicated write is never sent back to where it came from
    tokio::time::sleep(Duration::from_millis(200)).await;
    client_a.call("GET a", b"$1\r\n1\r\n").await;

    a.stop().await.unwrap();
    b.stop().await.unwrap();
}

#[tokio::test]
async fn test_nodes_dialing_each_other_apply_writes_once() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let a = start_node("node-a", dir_a.path()).await.unwrap();
    let b = start_node("node-b", dir_b.path()).await.unwrap();
    let mut client_a = TestClient::connect(a.query_addr()).await;
    let mut client_b = TestClient::connect(b.query_addr()).await;

    client_a
        .call(&format!("PEER CONNECT {}", b.peer_addr()), b"+OK\r\n")
        .await;
    client_b
        .call(&format!("PEER CONNECT {}", a.peer_addr()), b"+OK\r\n")
        .await;
    // one dialed and one accepted link on each side
    wait_until(|| a.node.mesh().connected_len() == 2 && b.node.mesh().connected_len() == 2).await;

    client_a.call("INCR a", b":1\r\n").await;
    wait_until(|| b.node.engine().keyspace().get(b"a").is_some()).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    client_b.call("GET a", b"$1\r\n1\r\n").await;

    client_b.call("INCR a", b":2\r\n").await;
    wait_until(|| a.node.engine().keyspace().get(b"a") == Some(b"2".to_vec())).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    client_a.call("GET a", b"$1\r\n2\r\n").await;

    a.stop().await.unwrap();
    b.stop().await.unwrap();
}

#[tokio::test]
async fn test_reads_are_not_replicated() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let a = start_node("node-a", dir_a.path()).await.unwrap();
    let b = start_node("node-b", dir_b.path()).await.unwrap();
    let mut client_a = TestClient::connect(a.query_addr()).await;

    client_a
        .call(&format!("PEER CONNECT {}", b.peer_addr()), b"+OK\r\n")
        .await;
    wait_until(|| a.node.mesh().connected_len() == 1).await;
    let logged_before = b.node.engine().wal().stats().write_ops();

    client_a.call("GET nothing", b"$-1\r\n").await;
    client_a.call("KEYS *", b"*0\r\n").await;
    client_a.call("SET marker 1", b"+OK\r\n").await;
    wait_until(|| b.node.engine().keyspace().get(b"marker").is_some()).await;

    assert_eq!(b.node.engine().keyspace().len(), 1);
    wait_until(|| b.node.engine().wal().stats().write_ops() == logged_before + 1).await;

    a.stop().await.unwrap();
    b.stop().await.unwrap();
}

#[tokio::test]
async fn test_peer_connect_rejects_malformed_address() {
    let dir = tempfile::tempdir().unwrap();
    let a = start_node("node-a", dir.path()).await.unwrap();
    let mut client = TestClient::connect(a.query_addr()).await;

    client.call("PEER CONNECT nowhere", b"-syntax error\r\n").await;
    assert!(a.node.mesh().is_empty());

    a.stop().await.unwrap();
}

#[tokio::test]
async fn test_removed_peer_stops_receiving_writes() {
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let a = start_node("node-a", dir_a.path()).await.unwrap();
    let b = start_node("node-b", dir_b.path()).await.unwrap();
    let mut client_a = TestClient::connect(a.query_addr()).await;
    let peer_key = b.peer_addr().to_string();

    client_a
        .call(&format!("PEER CONNECT {}", peer_key), b"+OK\r\n")
        .await;
    wait_until(|| b.node.mesh().connected_len() == 1).await;

    client_a
        .call(&format!("PEER REMOVE {}", peer_key), b"+OK\r\n")
        .await;
    wait_until(|| a.node.mesh().is_empty() && b.node.mesh().is_empty()).await;

    client_a.call("SET after 1", b"+OK\r\n").await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(b.node.engine().keyspace().get(b"after").is_none());

    a.stop().await.unwrap();
    b.stop().await.unwrap();
}
