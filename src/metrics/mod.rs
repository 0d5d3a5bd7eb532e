use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::core::Collector;
use prometheus::proto::Metric;
use prometheus::IntCounter;
use prometheus::IntCounterVec;
use prometheus::Opts;
use prometheus::Registry;

lazy_static! {
    /// Best-effort peer frames dropped because a bounded queue was full.
    /// `direction` is `inbound` or `outbound`.
    pub static ref PEER_FRAMES_DROPPED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("peer_frames_dropped_total", "Peer frames dropped on a full queue"),
        &["peer", "direction"]
    )
    .expect("metric can not be created");

    pub static ref PEER_QUERY_TIMEOUTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("peer_query_timeouts_total", "Peer round-trips that timed out"),
        &["peer"]
    )
    .expect("metric can not be created");

    pub static ref WAL_RECORDS_TOTAL: IntCounter =
        IntCounter::new("wal_records_total", "Records written to the write-ahead log")
            .expect("metric can not be created");

    pub static ref COMMANDS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("commands_total", "Commands executed, by verb"),
        &["verb"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER_ONCE: Once = Once::new();

pub fn register_custom_metrics(registry: &Registry) {
    let collectors: [Box<dyn prometheus::core::Collector>; 4] = [
        Box::new(PEER_FRAMES_DROPPED_TOTAL.clone()),
        Box::new(PEER_QUERY_TIMEOUTS_TOTAL.clone()),
        Box::new(WAL_RECORDS_TOTAL.clone()),
        Box::new(COMMANDS_TOTAL.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            tracing::warn!("collector can not be registered: {:?}", e);
        }
    }
}

/// Registers the crate counters in [`REGISTRY`]; later calls are no-ops.
pub fn init_metrics() {
    REGISTER_ONCE.call_once(|| register_custom_metrics(&REGISTRY));
}

const PEER_DIRECTIONS: [&str; 2] = ["inbound", "outbound"];

fn has_labels(
    metric: &Metric,
    labels: &[(&str, &str)],
) -> bool {
    labels.iter().all(|(name, value)| {
        metric
            .get_label()
            .iter()
            .any(|pair| pair.get_name() == *name && pair.get_value() == *value)
    })
}

/// Series of `vec` carrying every label in `labels`. Reading never creates
/// a series.
fn matching_series(
    vec: &IntCounterVec,
    labels: &[(&str, &str)],
) -> Vec<Metric> {
    vec.collect()
        .iter()
        .flat_map(|family| family.get_metric().iter())
        .filter(|metric| has_labels(metric, labels))
        .cloned()
        .collect()
}

/// Total frames dropped for `peer` in `direction` so far.
pub fn dropped_frames(
    peer: &str,
    direction: &str,
) -> u64 {
    matching_series(&PEER_FRAMES_DROPPED_TOTAL, &[("peer", peer), ("direction", direction)])
        .iter()
        .map(|metric| metric.get_counter().get_value() as u64)
        .sum()
}

/// Number of per-peer series currently held for `peer`.
pub fn peer_series(peer: &str) -> usize {
    matching_series(&PEER_FRAMES_DROPPED_TOTAL, &[("peer", peer)]).len()
        + matching_series(&PEER_QUERY_TIMEOUTS_TOTAL, &[("peer", peer)]).len()
}

/// Drops every per-peer series of `peer`, once it has left the mesh.
pub fn forget_peer(peer: &str) {
    for direction in PEER_DIRECTIONS {
        // absent series are fine
        let _ = PEER_FRAMES_DROPPED_TOTAL.remove_label_values(&[peer, direction]);
    }
    let _ = PEER_QUERY_TIMEOUTS_TOTAL.remove_label_values(&[peer]);
}
