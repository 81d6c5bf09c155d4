//! Structured logging helpers.
//!
//! Interaction logs carry the same field names everywhere so they can be
//! filtered and joined downstream:
//! - `transaction_id`: interaction correlator
//! - `uri`: the remote party
//! - `stage`: stage name, e.g. `INVOKE_ACK`
//! - `subscription_id`: for PUBSUB events

/// Log an interaction event with the standard fields.
///
/// ```rust,ignore
/// log_interaction!(debug, "Reply sent", header.transaction_id, &header.uri_to, header.stage_name());
/// ```
#[macro_export]
macro_rules! log_interaction {
    ($level:ident, $msg:expr, $transaction_id:expr, $uri:expr, $stage:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            transaction_id = ?$transaction_id,
            uri = %$uri,
            stage = $stage,
            $($($field)*,)?
            $msg
        )
    };
}

/// Log a subscription event with the standard fields.
#[macro_export]
macro_rules! log_subscription {
    ($level:ident, $msg:expr, $uri:expr, $subscription_id:expr $(, $($field:tt)*)?) => {
        tracing::$level!(
            uri = %$uri,
            subscription_id = %$subscription_id,
            $($($field)*,)?
            $msg
        )
    };
}
