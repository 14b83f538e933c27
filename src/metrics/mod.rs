use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::Encoder;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::IntCounterVec;
use prometheus::IntGaugeVec;
use prometheus::Opts;
use prometheus::Registry;
use tracing::warn;


pub(crate) const OUTCOME_SUCCESS: &str = "success";
pub(crate) const OUTCOME_FETCH_ERROR: &str = "fetch_error";
pub(crate) const OUTCOME_DECODE_ERROR: &str = "decode_error";

lazy_static! {
    pub static ref POLL_CYCLES: IntCounterVec = IntCounterVec::new(
        Opts::new("kv_watch_poll_cycles", "Poll cycles by watched root and outcome"),
        &["root", "outcome"]
    )
    .expect("metric can not be created");

    pub static ref POLL_DURATION_MS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "kv_watch_poll_duration_ms",
            "Duration of successful poll cycles in ms, long-poll wait included"
        )
        .buckets(prometheus::exponential_buckets(1.0, 4.0, 10).expect("valid buckets")),
        &["root"]
    )
    .expect("metric can not be created");

    pub static ref LISTENER_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("kv_watch_listener_failures", "Listener invocations that panicked"),
        &["root"]
    )
    .expect("metric can not be created");

    pub static ref SNAPSHOT_KEYS: IntGaugeVec = IntGaugeVec::new(
        Opts::new("kv_watch_snapshot_keys", "Keys in the current snapshot"),
        &["root"]
    )
    .expect("metric can not be created");

    pub static ref LATEST_INDEX: IntGaugeVec = IntGaugeVec::new(
        Opts::new("kv_watch_latest_index", "Cursor of the current snapshot"),
        &["root"]
    )
    .expect("metric can not be created");

    pub static ref REGISTRY: Registry = Registry::new();
}

static REGISTER: Once = Once::new();

pub fn register_custom_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(POLL_CYCLES.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(POLL_DURATION_MS.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(LISTENER_FAILURES.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(SNAPSHOT_KEYS.clone()))
            .expect("collector can be registered");
        REGISTRY
            .register(Box::new(LATEST_INDEX.clone()))
            .expect("collector can be registered");
    });
}

/// Renders the watcher metrics in the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    register_custom_metrics();

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        warn!("could not encode custom metrics: {}", e);
    }

    match String::from_utf8(buffer) {
        Ok(body) => body,
        Err(e) => {
            warn!("custom metrics could not be from_utf8'd: {}", e);
            String::default()
        }
    }
}

pub(crate) fn record_success(
    root: &str,
    keys: usize,
    index: u64,
    elapsed_ms: f64,
) {
    POLL_CYCLES.with_label_values(&[root, OUTCOME_SUCCESS]).inc();
    POLL_DURATION_MS.with_label_values(&[root]).observe(elapsed_ms);
    SNAPSHOT_KEYS
        .with_label_values(&[root])
        .set(i64::try_from(keys).unwrap_or(i64::MAX));
    LATEST_INDEX
        .with_label_values(&[root])
        .set(i64::try_from(index).unwrap_or(i64::MAX));
}

pub(crate) fn record_failure(
    root: &str,
    outcome: &'static str,
) {
    POLL_CYCLES.with_label_values(&[root, outcome]).inc();
}

pub(crate) fn record_listener_failures(
    root: &str,
    failures: usize,
) {
    if failures > 0 {
        LISTENER_FAILURES
            .with_label_values(&[root])
            .inc_by(failures as u64);
    }
}
