//! Prometheus metrics (§10.1: "the send engine does not log per-message...
//! it increments counters instead").
//!
//! Tracks admission outcomes, rehash effects, and connection-pool occupancy
//! so operators can watch the node's health without per-line log volume.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    /// Admission rejections, labeled by `AdmissionError` variant name.
    pub static ref ADMISSION_REJECTED: IntCounterVec = IntCounterVec::new(
        Opts::new("ircd_admission_rejected_total", "Connections rejected at admission, by reason"),
        &["reason"],
    )
    .unwrap();

    /// Local connections closed for exceeding their sendq limit (§4.3 P2).
    pub static ref SENDQ_EXCEEDED: IntCounter = IntCounter::new(
        "ircd_sendq_exceeded_total",
        "Connections closed for exceeding their sendq limit",
    )
    .unwrap();

    /// Count of successful rehashes (§4.4).
    pub static ref REHASH_SUCCESS: IntCounter =
        IntCounter::new("ircd_rehash_success_total", "Successful rehash operations").unwrap();

    /// Count of rehashes rejected due to a bad config file.
    pub static ref REHASH_FAILURE: IntCounter =
        IntCounter::new("ircd_rehash_failure_total", "Rehash attempts that failed to load/validate").unwrap();

    /// Operators deopered across all rehashes because their `ConfItem` no
    /// longer matches (S4).
    pub static ref REHASH_DEOPERED: IntCounter =
        IntCounter::new("ircd_rehash_deopered_total", "Local operators deopered by a rehash").unwrap();

    /// Currently registered local users.
    pub static ref LOCAL_USERS: IntGauge =
        IntGauge::new("ircd_local_users", "Currently registered local users").unwrap();

    /// Currently linked servers (local + remote, excluding self).
    pub static ref LINKED_SERVERS: IntGauge =
        IntGauge::new("ircd_linked_servers", "Currently linked servers").unwrap();

    /// Currently active (non-empty) channels.
    pub static ref ACTIVE_CHANNELS: IntGauge =
        IntGauge::new("ircd_active_channels", "Currently active channels").unwrap();

    /// Netsplit-driven QUITs fanned out to local users (S3).
    pub static ref NETSPLIT_QUITS: IntCounter =
        IntCounter::new("ircd_netsplit_quits_total", "QUITs announced due to a netsplit").unwrap();
}

/// Register every metric. Must run once at startup before any metric is
/// touched, so `/metrics` always reports a complete family list even before
/// the first event of a given kind occurs.
pub fn init() {
    REGISTRY.register(Box::new(ADMISSION_REJECTED.clone())).unwrap();
    REGISTRY.register(Box::new(SENDQ_EXCEEDED.clone())).unwrap();
    REGISTRY.register(Box::new(REHASH_SUCCESS.clone())).unwrap();
    REGISTRY.register(Box::new(REHASH_FAILURE.clone())).unwrap();
    REGISTRY.register(Box::new(REHASH_DEOPERED.clone())).unwrap();
    REGISTRY.register(Box::new(LOCAL_USERS.clone())).unwrap();
    REGISTRY.register(Box::new(LINKED_SERVERS.clone())).unwrap();
    REGISTRY.register(Box::new(ACTIVE_CHANNELS.clone())).unwrap();
    REGISTRY.register(Box::new(NETSPLIT_QUITS.clone())).unwrap();
}

/// Gather all metrics and encode them in Prometheus text format for the
/// `/metrics` HTTP handler.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}
