use crate::commons::start_node;
use crate::commons::TestClient;

#[tokio::test]
async fn test_restart_replays_logged_writes() {
    let dir = tempfile::tempdir().unwrap();

    let node = start_node("node-a", dir.path()).await.unwrap();
    let mut client = TestClient::connect(node.query_addr()).await;
    client.call("SET greeting hello", b"+OK\r\n").await;
    client.call("INCR visits", b":1\r\n").await;
    client.call("INCR visits", b":2\r\n").await;
    client.call("SET doomed 1", b"+OK\r\n").await;
    client.call("DEL doomed", b":1\r\n").await;
    node.stop().await.unwrap();

    let node = start_node("node-a", dir.path()).await.unwrap();
    let mut client = TestClient::connect(node.query_addr()).await;
    client.call("GET greeting", b"$5\r\nhello\r\n").await;
    client.call("INCR visits", b":3\r\n").await;
    client.call("GET doomed", b"$-1\r\n").await;
    node.stop().await.unwrap();
}

#[tokio::test]
async fn test_recovery_survives_several_restarts() {
    let dir = tempfile::tempdir().unwrap();

    for round in 1..=3 {
        let node = start_node("node-a", dir.path()).await.unwrap();
        let mut client = TestClient::connect(node.query_addr()).await;
        client
            .call("INCR rounds", format!(":{}\r\n", round).as_bytes())
            .await;
        node.stop().await.unwrap();
    }
}

#[tokio::test]
async fn test_flushdb_is_replayed() {
    let dir = tempfile::tempdir().unwrap();

    let node = start_node("node-a", dir.path()).await.unwrap();
    let mut client = TestClient::connect(node.query_addr()).await;
    client.call("SET k v", b"+OK\r\n").await;
    client.call("FLUSHDB", b"+OK\r\n").await;
    client.call("SET kept v", b"+OK\r\n").await;
    node.stop().await.unwrap();

    let node = start_node("node-a", dir.path()).await.unwrap();
    assert_eq!(node.node.engine().keyspace().len(), 1);
    assert!(node.node.engine().keyspace().get(b"kept").is_some());
    node.stop().await.unwrap();
}
