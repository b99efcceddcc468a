//! Prometheus metrics for the worker.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use xform_models::SubmissionStatus;

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const TRANSFORM_DURATION_SECONDS: &str = "xform_transform_duration_seconds";
    pub const FILES_PROCESSED_TOTAL: &str = "xform_files_processed_total";
    pub const DELIVERIES_TOTAL: &str = "xform_deliveries_total";
}

const DURATION_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0];

/// Install the Prometheus recorder and serve `/metrics` on `port`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(port: u16) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)))
        .set_buckets_for_metric(
            Matcher::Full(names::TRANSFORM_DURATION_SECONDS.to_string()),
            DURATION_BUCKETS,
        )
        .map_err(|e| WorkerError::Metrics(e.to_string()))?
        .install()
        .map_err(|e| WorkerError::Metrics(e.to_string()))
}

/// Record how long a delivery took, labeled by the final job status.
pub fn record_transform_duration(transformer: &str, status: SubmissionStatus, started: Instant) {
    let labels = [
        ("status", status.as_str().to_string()),
        ("type", transformer.to_string()),
    ];
    histogram!(names::TRANSFORM_DURATION_SECONDS, &labels).record(started.elapsed().as_secs_f64());
}

/// Record a processed file by outcome kind.
pub fn record_file_processed(kind: &str) {
    let labels = [("kind", kind.to_string())];
    counter!(names::FILES_PROCESSED_TOTAL, &labels).increment(1);
}

/// Record how a delivery was settled.
pub fn record_delivery(disposition: &str) {
    let labels = [("disposition", disposition.to_string())];
    counter!(names::DELIVERIES_TOTAL, &labels).increment(1);
}
