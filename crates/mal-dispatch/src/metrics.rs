//! Dispatch metrics.
//!
//! In-process atomic counters with a serializable snapshot. Each record call
//! also feeds the matching Prometheus metric in `mal-telemetry`.

use mal_telemetry::{
    metric_inc, INTERACTION_ERRORS, LOST_CONSUMERS, MESSAGES_RECEIVED, MESSAGES_SENT,
    NOTIFY_SENT, PUBLISH_REJECTED,
};
use mal_types::{MalError, MessageHeader};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Runtime dispatch counters
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    // Message counters
    pub messages_sent: AtomicU64,
    pub messages_received: AtomicU64,
    pub error_replies_sent: AtomicU64,
    pub send_failures: AtomicU64,

    // Routing
    pub rejected_messages: AtomicU64,

    // Broker
    pub notifies_sent: AtomicU64,
    pub publishes_rejected: AtomicU64,
    pub lost_consumers: AtomicU64,

    // Synchronous waits
    pub sync_timeouts: AtomicU64,
}

/// Point-in-time copy of `DispatchMetrics`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub error_replies_sent: u64,
    pub send_failures: u64,
    pub rejected_messages: u64,
    pub notifies_sent: u64,
    pub publishes_rejected: u64,
    pub lost_consumers: u64,
    pub sync_timeouts: u64,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message handed to the endpoint
    pub fn record_sent(&self, header: &MessageHeader) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        if header.is_error_message {
            self.error_replies_sent.fetch_add(1, Ordering::Relaxed);
        }
        metric_inc!(
            MESSAGES_SENT,
            &[header.interaction_type.to_string().as_str(), header.stage_name()]
        );
    }

    /// Record a message taken from the endpoint
    pub fn record_received(&self, header: &MessageHeader) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
        metric_inc!(
            MESSAGES_RECEIVED,
            &[header.interaction_type.to_string().as_str(), header.stage_name()]
        );
    }

    /// Record a local send failure
    pub fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
        metric_inc!(INTERACTION_ERRORS, &["send_failure"]);
    }

    /// Record an inbound message that could not be processed
    pub fn record_rejected(&self, err: &MalError) {
        self.rejected_messages.fetch_add(1, Ordering::Relaxed);
        metric_inc!(INTERACTION_ERRORS, &[error_kind(err)]);
    }

    pub fn record_notify(&self) {
        self.notifies_sent.fetch_add(1, Ordering::Relaxed);
        metric_inc!(NOTIFY_SENT);
    }

    pub fn record_publish_rejected(&self, err: &MalError) {
        self.publishes_rejected.fetch_add(1, Ordering::Relaxed);
        metric_inc!(PUBLISH_REJECTED, &[error_kind(err)]);
    }

    pub fn record_lost_consumer(&self) {
        self.lost_consumers.fetch_add(1, Ordering::Relaxed);
        metric_inc!(LOST_CONSUMERS);
    }

    pub fn record_sync_timeout(&self) {
        self.sync_timeouts.fetch_add(1, Ordering::Relaxed);
        metric_inc!(INTERACTION_ERRORS, &["timeout"]);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            error_replies_sent: self.error_replies_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            rejected_messages: self.rejected_messages.load(Ordering::Relaxed),
            notifies_sent: self.notifies_sent.load(Ordering::Relaxed),
            publishes_rejected: self.publishes_rejected.load(Ordering::Relaxed),
            lost_consumers: self.lost_consumers.load(Ordering::Relaxed),
            sync_timeouts: self.sync_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Low-cardinality label for an error.
fn error_kind(err: &MalError) -> &'static str {
    match err {
        MalError::Standard(_) => "remote",
        MalError::UnexpectedStage { .. } => "unexpected_stage",
        MalError::UnroutableStage { .. } => "unroutable",
        MalError::UnknownTransaction(_) => "unknown_transaction",
        MalError::IncorrectState(_) => "incorrect_state",
        MalError::BadEncoding(_) => "bad_encoding",
        MalError::PublishRightsViolation { .. } => "rights",
        MalError::DomainViolation { .. } => "domain",
        MalError::DestinationUnknown(_) => "destination_unknown",
        MalError::DeliveryTimedOut(_) => "timeout",
        MalError::Transport(_) => "transport",
        MalError::Security(_) => "security",
        MalError::Config(_) => "config",
        MalError::Shutdown => "shutdown",
    }
}
