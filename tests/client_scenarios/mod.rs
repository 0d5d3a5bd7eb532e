use crate::commons::start_node;
use crate::commons::TestClient;

#[tokio::test]
async fn test_set_get_del() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node("node-a", dir.path()).await.unwrap();
    let mut client = TestClient::connect(node.query_addr()).await;

    client.call("SET key 1337", b"+OK\r\n").await;
    client.call("GET key", b"$4\r\n1337\r\n").await;
    client.call("GET missing", b"$-1\r\n").await;
    client.call("DEL key", b":1\r\n").await;
    client.call("DEL key", b":0\r\n").await;

    node.stop().await.unwrap();
}

#[tokio::test]
async fn test_ping() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node("node-a", dir.path()).await.unwrap();
    let mut client = TestClient::connect(node.query_addr()).await;

    client.call("PING foobar", b"$6\r\nfoobar\r\n").await;
    client.call("PING", b"+PONG\r\n").await;
    client.call("PING a b", b"-Too many arguments\r\n").await;

    node.stop().await.unwrap();
}

#[tokio::test]
async fn test_binary_value_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node("node-a", dir.path()).await.unwrap();
    let mut client = TestClient::connect(node.query_addr()).await;
    let value: Vec<u8> = vec![0, 255, b'\r', b'\n', b'$', b'*', 7, b'\r', b'\n'];

    let mut set = format!("*3\r\n$3\r\nSET\r\n$3\r\nbin\r\n${}\r\n", value.len()).into_bytes();
    set.extend_from_slice(&value);
    set.extend_from_slice(b"\r\n");
    client.send(&set).await;
    client.expect(b"+OK\r\n").await;

    client.send(b"*2\r\n$3\r\nGET\r\n$3\r\nbin\r\n").await;
    let mut expected = format!("${}\r\n", value.len()).into_bytes();
    expected.extend_from_slice(&value);
    expected.extend_from_slice(b"\r\n");
    client.expect(&expected).await;

    node.stop().await.unwrap();
}

#[tokio::test]
async fn test_counters_and_errors_keep_connection_open() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node("node-a", dir.path()).await.unwrap();
    let mut client = TestClient::connect(node.query_addr()).await;

    client.call("INCR hits", b":1\r\n").await;
    client.call("DECR gone", b":-1\r\n").await;
    client.call("SET word abc", b"+OK\r\n").await;
    client
        .call("INCR word", b"-Value is not an integer or out of range\r\n")
        .await;
    client.call("GET word", b"$3\r\nabc\r\n").await;
    client.call("SELECT 1", b"-invalid DB index\r\n").await;
    client.call("NOSUCH thing", b"-ERR unknown command 'nosuch thing'\r\n").await;
    client.call("TTL word", b":-1\r\n").await;

    node.stop().await.unwrap();
}

#[tokio::test]
async fn test_keys_and_scan() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node("node-a", dir.path()).await.unwrap();
    let mut client = TestClient::connect(node.query_addr()).await;

    client.call("SET apple 1", b"+OK\r\n").await;
    client.call("SET banana 2", b"+OK\r\n").await;
    client.call("KEYS b*", b"*1\r\n$6\r\nbanana\r\n").await;
    client
        .call("SCAN 0 COUNT 10 MATCH a*", b"*2\r\n$1\r\n0\r\n*1\r\n$5\r\napple\r\n")
        .await;

    node.stop().await.unwrap();
}

#[tokio::test]
async fn test_quit_closes_connection() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node("node-a", dir.path()).await.unwrap();
    let mut client = TestClient::connect(node.query_addr()).await;

    client.call("QUIT", b"+OK\r\n").await;
    assert!(client.is_closed().await);

    node.stop().await.unwrap();
}

#[tokio::test]
async fn test_clients_are_listed() {
    let dir = tempfile::tempdir().unwrap();
    let node = start_node("node-a", dir.path()).await.unwrap();
    let mut first = TestClient::connect(node.query_addr()).await;
    let mut second = TestClient::connect(node.query_addr()).await;

    first.call("CLIENT SETNAME first", b"+OK\r\n").await;
    first.call("CLIENT GETNAME", b"$5\r\nfirst\r\n").await;
    second.call("CLIENT GETNAME", b"$-1\r\n").await;
    assert_eq!(node.node.engine().clients().len(), 2);

    node.stop().await.unwrap();
}
