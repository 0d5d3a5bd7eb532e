//! Task set serving one established peer connection.
//!
//! The connection carries queries and responses in both directions:
//!
//! ```text
//!              +--> query queue ----> query workers ----> engine --+
//! read loop ---+                                                   | responses
//!              +--> response queue -> response workers -> waiters  v
//!
//! writer (queries)   <-- PeerLink::queries   <-- broadcast, peer.query
//! writer (responses) <-- PeerLink::responses <-- query workers
//! ```
//!
//! Every queue is bounded and fed with `try_send`: a frame that does not
//! fit is dropped and counted, so the read loop never stalls.

use std::sync::Arc;

use futures::SinkExt;
use futures::StreamExt;
use tokio::io::AsyncRead;
use tokio::io::AsyncWrite;
use tokio::io::WriteHalf;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::metrics::PEER_FRAMES_DROPPED_TOTAL;
use crate::protocol::encode_args;
use crate::protocol::parse;
use crate::protocol::FrameKind;
use crate::protocol::PeerCodec;
use crate::protocol::PeerFrame;
use crate::protocol::Reply;
use crate::Engine;
use crate::MeshConfig;
use crate::PeerLink;
use crate::PeerNode;
use crate::Session;

type SharedSink<S> = Arc<Mutex<FramedWrite<WriteHalf<S>, PeerCodec>>>;
type SharedQueue = Arc<Mutex<mpsc::Receiver<PeerFrame>>>;

/// Runs the connection until the socket fails, the remote closes it or
/// the peer is removed. The peer is detached on return.
pub async fn run_peer_connection<S>(
    stream: S,
    peer: Arc<PeerNode>,
    engine: Arc<Engine>,
    config: MeshConfig,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut frames = FramedRead::new(reader, PeerCodec::default());
    let sink: SharedSink<S> = Arc::new(Mutex::new(FramedWrite::new(writer, PeerCodec::default())));

    let closed = peer.removed().child_token();
    let (queries_out_tx, queries_out_rx) = mpsc::channel(config.outbound_queue_capacity);
    let (responses_out_tx, responses_out_rx) = mpsc::channel(config.outbound_queue_capacity);
    let (queries_in_tx, queries_in_rx) = mpsc::channel(config.inbound_queue_capacity);
    let (responses_in_tx, responses_in_rx) = mpsc::channel(config.inbound_queue_capacity);

    let mut handles: Vec<JoinHandle<()>> = vec![];
    handles.push(tokio::spawn(write_frames(
        queries_out_rx,
        sink.clone(),
        peer.clone(),
        closed.clone(),
    )));
    handles.push(tokio::spawn(write_frames(
        responses_out_rx,
        sink,
        peer.clone(),
        closed.clone(),
    )));

    let queries_in: SharedQueue = Arc::new(Mutex::new(queries_in_rx));
    let responses_in: SharedQueue = Arc::new(Mutex::new(responses_in_rx));
    for _ in 0..config.workers_per_peer {
        handles.push(tokio::spawn(serve_queries(
            queries_in.clone(),
            peer.clone(),
            engine.clone(),
            closed.clone(),
        )));
        handles.push(tokio::spawn(resolve_responses(
            responses_in.clone(),
            peer.clone(),
            closed.clone(),
        )));
    }

    peer.attach(PeerLink {
        queries: queries_out_tx,
        responses: responses_out_tx,
        closed: closed.clone(),
    });
    info!(peer = %peer.key(), direction = ?peer.direction(), "peer link established");

    handles.push(tokio::spawn(exchange_identity(
        peer.clone(),
        config.clone(),
        closed.clone(),
    )));

    loop {
        let next = tokio::select! {
            _ = closed.cancelled() => break,
            next = frames.next() => next,
        };
        match next {
            Some(Ok(frame)) => {
                peer.stats().add_bytes_in(frame.wire_len());
                let queue = match frame.kind {
                    FrameKind::Query => &queries_in_tx,
                    FrameKind::Response => &responses_in_tx,
                };
                let kind = frame.kind;
                if queue.try_send(frame).is_err() {
                    PEER_FRAMES_DROPPED_TOTAL
                        .with_label_values(&[peer.key(), "inbound"])
                        .inc();
                    debug!(peer = %peer.key(), "inbound {} queue full, frame dropped", kind.as_str());
                }
            }
            Some(Err(e)) => {
                peer.stats().record_failure();
                warn!(peer = %peer.key(), "peer read failed: {}", e);
                break;
            }
            None => {
                // EOF is a read failure as well
                peer.stats().record_failure();
                info!(peer = %peer.key(), "peer closed the connection");
                break;
            }
        }
    }

    closed.cancel();
    peer.detach();
    for handle in handles {
        if let Err(e) = handle.await {
            warn!(peer = %peer.key(), "peer task failed: {}", e);
        }
    }
    debug!(peer = %peer.key(), "peer connection torn down");
}

async fn write_frames<S>(
    mut queue: mpsc::Receiver<PeerFrame>,
    sink: SharedSink<S>,
    peer: Arc<PeerNode>,
    closed: CancellationToken,
) where
    S: AsyncWrite,
{
    loop {
        let frame = tokio::select! {
            _ = closed.cancelled() => break,
            frame = queue.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
        };
        let len = frame.wire_len();
        let result = sink.lock().await.send(frame).await;
        match result {
            Ok(()) => peer.stats().add_bytes_out(len),
            Err(e) => {
                warn!(peer = %peer.key(), "peer write failed: {}", e);
                closed.cancel();
                break;
            }
        }
    }
}

/// Next frame from a queue shared by several workers, or `None` once the
/// connection is closed.
async fn next_frame(
    queue: &SharedQueue,
    closed: &CancellationToken,
) -> Option<PeerFrame> {
    let mut queue = queue.lock().await;
    tokio::select! {
        _ = closed.cancelled() => None,
        frame = queue.recv() => frame,
    }
}

async fn serve_queries(
    queue: SharedQueue,
    peer: Arc<PeerNode>,
    engine: Arc<Engine>,
    closed: CancellationToken,
) {
    let session = Session::peer();
    while let Some(frame) = next_frame(&queue, &closed).await {
        let reply = match parse(&frame.payload) {
            Ok(command) => engine.execute(&session, &command),
            Err(e) => Reply::error(e.to_string()),
        };
        trace!(peer = %peer.key(), "query {} answered", frame.correlation_id);
        if let Err(e) = peer.enqueue_response(PeerFrame::response(frame.correlation_id, &reply)) {
            debug!(peer = %peer.key(), "response not sent: {}", e);
        }
    }
}

async fn resolve_responses(
    queue: SharedQueue,
    peer: Arc<PeerNode>,
    closed: CancellationToken,
) {
    while let Some(frame) = next_frame(&queue, &closed).await {
        match Reply::decode(&frame.payload) {
            Ok(reply) => {
                peer.resolve(&frame.correlation_id, reply.with_correlation_id(frame.correlation_id.clone()));
            }
            Err(e) => warn!(peer = %peer.key(), "undecodable response {}: {}", frame.correlation_id, e),
        }
    }
}

/// Asks the remote for its node id and records it on the peer, then puts
/// the link in service. A failed exchange leaves the link usable without
/// an id.
async fn exchange_identity(
    peer: Arc<PeerNode>,
    config: MeshConfig,
    closed: CancellationToken,
) {
    let query = encode_args(&["peer", "id"]);
    let result = tokio::select! {
        _ = closed.cancelled() => return,
        result = peer.query(&query, config.query_timeout()) => result,
    };
    match result {
        Ok(reply) if !reply.is_error() => {
            let id = reply.text();
            info!(peer = %peer.key(), id = %id, "peer identified");
            peer.set_id(id);
        }
        Ok(reply) => warn!(peer = %peer.key(), "peer refused identity query: {}", reply.text()),
        Err(e) => warn!(peer = %peer.key(), "identity exchange failed: {}", e),
    }
    if peer.mark_connected() {
        info!(peer = %peer.key(), "peer link in service");
    }
}
