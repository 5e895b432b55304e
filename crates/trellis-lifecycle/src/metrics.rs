//! Lifecycle metrics.
//!
//! Recorded through the `metrics` facade; nothing is exported unless the host
//! process installs a recorder (the API installs the Prometheus exporter).
//!
//! # Metrics
//!
//! - `trellis_subscriptions_created_total` - Subscriptions persisted and announced
//! - `trellis_subscriptions_cancelled_total` - Successful cancellations
//! - `trellis_publish_failures_total` - Rows persisted whose event could not be published
//! - `trellis_worker_messages_total` - Worker deliveries by outcome
//! - `trellis_operation_duration_seconds` - Service operation latency by operation and result

use std::time::Instant;

use metrics::{counter, histogram};

/// Metric name for created subscriptions.
pub const SUBSCRIPTIONS_CREATED_TOTAL: &str = "trellis_subscriptions_created_total";

/// Metric name for cancelled subscriptions.
pub const SUBSCRIPTIONS_CANCELLED_TOTAL: &str = "trellis_subscriptions_cancelled_total";

/// Metric name for publish failures after a successful persist.
pub const PUBLISH_FAILURES_TOTAL: &str = "trellis_publish_failures_total";

/// Metric name for worker message outcomes.
pub const WORKER_MESSAGES_TOTAL: &str = "trellis_worker_messages_total";

/// Metric name for operation latency.
pub const OPERATION_DURATION_SECONDS: &str = "trellis_operation_duration_seconds";

/// Register metric descriptions with the installed recorder.
pub fn describe() {
    metrics::describe_counter!(
        SUBSCRIPTIONS_CREATED_TOTAL,
        "Total subscriptions created"
    );
    metrics::describe_counter!(
        SUBSCRIPTIONS_CANCELLED_TOTAL,
        "Total subscriptions cancelled"
    );
    metrics::describe_counter!(
        PUBLISH_FAILURES_TOTAL,
        "Subscriptions persisted whose creation event failed to publish"
    );
    metrics::describe_counter!(
        WORKER_MESSAGES_TOTAL,
        "Activation worker deliveries by outcome"
    );
    metrics::describe_histogram!(
        OPERATION_DURATION_SECONDS,
        "Lifecycle operation latency in seconds by operation and result"
    );
}

/// Record operation duration with result label.
#[inline]
pub fn record_op_duration(operation: &'static str, start: Instant, success: bool) {
    let result = if success { "ok" } else { "err" };
    histogram!(
        OPERATION_DURATION_SECONDS,
        "operation" => operation,
        "result" => result
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record one processed worker delivery.
#[inline]
pub fn record_worker_outcome(outcome: &'static str) {
    counter!(WORKER_MESSAGES_TOTAL, "outcome" => outcome).increment(1);
}
