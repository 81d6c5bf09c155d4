//! Prometheus metrics for the MAL runtime.
//!
//! All metrics follow the naming convention: `mal_<component>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts,
    Registry, TextEncoder,
};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // DISPATCH METRICS
    // =========================================================================

    /// Messages handed to an endpoint
    pub static ref MESSAGES_SENT: CounterVec = CounterVec::new(
        Opts::new("mal_dispatch_messages_sent_total", "Messages sent"),
        &["interaction", "stage"]
    ).expect("metric creation failed");

    /// Messages received from an endpoint
    pub static ref MESSAGES_RECEIVED: CounterVec = CounterVec::new(
        Opts::new("mal_dispatch_messages_received_total", "Messages received"),
        &["interaction", "stage"]
    ).expect("metric creation failed");

    /// Errors by standard error name
    pub static ref INTERACTION_ERRORS: CounterVec = CounterVec::new(
        Opts::new("mal_dispatch_errors_total", "Interaction errors by kind"),
        &["kind"]
    ).expect("metric creation failed");

    /// Time synchronous callers spend waiting for a result
    pub static ref SYNC_WAIT_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "mal_dispatch_sync_wait_duration_seconds",
            "Time spent waiting for a synchronous result"
        ).buckets(exponential_buckets(0.0001, 2.0, 16).unwrap_or_default())
    ).expect("metric creation failed");

    // =========================================================================
    // INTERACTION METRICS
    // =========================================================================

    /// In-flight transactions
    pub static ref PENDING_TRANSACTIONS: Gauge = Gauge::new(
        "mal_interaction_pending_transactions",
        "Number of in-flight transactions"
    ).expect("metric creation failed");

    // =========================================================================
    // BROKER METRICS
    // =========================================================================

    /// NOTIFY messages sent by the broker
    pub static ref NOTIFY_SENT: Counter = Counter::new(
        "mal_broker_notify_sent_total",
        "NOTIFY messages sent to consumers"
    ).expect("metric creation failed");

    /// PUBLISH batches rejected
    pub static ref PUBLISH_REJECTED: CounterVec = CounterVec::new(
        Opts::new("mal_broker_publish_rejected_total", "Rejected PUBLISH batches"),
        &["reason"]  // reason: rights/domain/state/encoding
    ).expect("metric creation failed");

    /// Consumers removed after a failed NOTIFY
    pub static ref LOST_CONSUMERS: Counter = Counter::new(
        "mal_broker_lost_consumers_total",
        "Consumers removed after NOTIFY delivery failed"
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Dispatch
        Box::new(MESSAGES_SENT.clone()),
        Box::new(MESSAGES_RECEIVED.clone()),
        Box::new(INTERACTION_ERRORS.clone()),
        Box::new(SYNC_WAIT_DURATION.clone()),
        // Interaction
        Box::new(PENDING_TRANSACTIONS.clone()),
        // Broker
        Box::new(NOTIFY_SENT.clone()),
        Box::new(PUBLISH_REJECTED.clone()),
        Box::new(LOST_CONSUMERS.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

/// Timer guard for automatic histogram observation.
pub struct HistogramTimer {
    histogram: Histogram,
    start: std::time::Instant,
}

impl HistogramTimer {
    /// Start a new timer for the given histogram.
    pub fn new(histogram: &Histogram) -> Self {
        Self {
            histogram: histogram.clone(),
            start: std::time::Instant::now(),
        }
    }
}

impl Drop for HistogramTimer {
    fn drop(&mut self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Start timing for a histogram. Observation happens on drop.
#[macro_export]
macro_rules! time_histogram {
    ($histogram:expr) => {
        $crate::metrics::HistogramTimer::new(&$histogram)
    };
}
