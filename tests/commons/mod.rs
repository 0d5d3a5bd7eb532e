use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use meshkv::Node;
use meshkv::NodeBuilder;
use meshkv::Result;
use meshkv::Settings;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;

pub const WAIT: Duration = Duration::from_secs(10);

/// A node served in the background of a test.
pub struct TestNode {
    pub node: Arc<Node>,
    shutdown: watch::Sender<()>,
    handle: JoinHandle<Result<()>>,
}

impl TestNode {
    pub fn query_addr(&self) -> SocketAddr {
        self.node.query_addr().expect("query service enabled")
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.node.peer_addr()
    }

    /// Signals shutdown and waits until the node has closed its log.
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(());
        time::timeout(WAIT, self.handle)
            .await
            .expect("node stops in time")
            .expect("node task joins")
    }
}

/// Starts a node on ephemeral local ports with its log under `wal_dir`.
pub async fn start_node(
    id: &str,
    wal_dir: &Path,
) -> Result<TestNode> {
    crate::enable_logger();

    let mut settings = Settings::default();
    settings.network.peer_listen = "127.0.0.1:0".parse().unwrap();
    settings.network.query_listen = "127.0.0.1:0".parse().unwrap();
    settings.wal.dir = wal_dir.to_path_buf();
    settings.retry.peer_dial.base_delay_ms = 50;
    settings.retry.peer_dial.max_delay_ms = 500;

    let (shutdown, shutdown_rx) = watch::channel(());
    let node = NodeBuilder::new(settings, shutdown_rx)
        .node_id(id)
        .build()
        .await?
        .start_peer_server()
        .start_query_server()
        .ready()?;

    let runner = node.clone();
    let handle = tokio::spawn(async move { runner.run().await });
    wait_until(|| node.server_is_ready()).await;

    Ok(TestNode {
        node,
        shutdown,
        handle,
    })
}

pub async fn wait_until(cond: impl Fn() -> bool) {
    time::timeout(WAIT, async {
        while !cond() {
            time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition reached in time");
}

/// A query client speaking the wire protocol over TCP.
pub struct TestClient {
    stream: TcpStream,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect to query service");
        Self { stream }
    }

    pub async fn send(
        &mut self,
        bytes: &[u8],
    ) {
        self.stream.write_all(bytes).await.expect("write to node");
    }

    /// Sends `command` and checks the node answers exactly `expected`.
    pub async fn call(
        &mut self,
        command: &str,
        expected: &[u8],
    ) {
        self.send(format!("{}\r\n", command).as_bytes()).await;
        self.expect(expected).await;
    }

    pub async fn expect(
        &mut self,
        expected: &[u8],
    ) {
        let mut got = vec![0u8; expected.len()];
        time::timeout(WAIT, self.stream.read_exact(&mut got))
            .await
            .expect("reply in time")
            .expect("read reply");
        assert_eq!(
            String::from_utf8_lossy(&got),
            String::from_utf8_lossy(expected),
            "unexpected reply"
        );
    }

    /// True once the node has closed the connection.
    pub async fn is_closed(&mut self) -> bool {
        let mut byte = [0u8; 1];
        matches!(time::timeout(WAIT, self.stream.read(&mut byte)).await, Ok(Ok(0)))
    }
}
