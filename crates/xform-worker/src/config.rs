//! Worker configuration.

use std::time::Duration;

use crate::error::{WorkerError, WorkerResult};

/// What a worker transforms: source and target kinds plus their extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformerSpec {
    /// Source kind, e.g. "c"; part of the queue name and metric label
    pub source_kind: String,
    /// Suffix selecting files to transform, e.g. ".c"
    pub source_extension: String,
    /// Target kind, e.g. "go"
    pub target_kind: String,
    /// Suffix replacing `source_extension` on outputs, e.g. ".go"
    pub target_extension: String,
}

impl TransformerSpec {
    pub fn new(
        source_kind: impl Into<String>,
        source_extension: impl Into<String>,
        target_kind: impl Into<String>,
        target_extension: impl Into<String>,
    ) -> Self {
        Self {
            source_kind: source_kind.into(),
            source_extension: source_extension.into(),
            target_kind: target_kind.into(),
            target_extension: target_extension.into(),
        }
    }

    /// Create from environment variables. All four are required.
    pub fn from_env() -> WorkerResult<Self> {
        Ok(Self {
            source_kind: required_var("TRANSFORM_SOURCE_KIND")?,
            source_extension: required_var("TRANSFORM_SOURCE_EXTENSION")?,
            target_kind: required_var("TRANSFORM_TARGET_KIND")?,
            target_extension: required_var("TRANSFORM_TARGET_EXTENSION")?,
        })
    }

    /// Metric label identifying this transformer pair.
    pub fn label(&self) -> String {
        format!("{}-{}", self.source_kind, self.target_kind)
    }
}

fn required_var(name: &str) -> WorkerResult<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(WorkerError::config_error(format!("{} not set", name))),
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum concurrent jobs
    pub max_concurrent_jobs: usize,
    /// How long a consume call blocks waiting for new messages
    pub consume_block: Duration,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How often the worker scans for pending messages to re-present
    pub claim_interval: Duration,
    /// Minimum idle time before a pending message is redelivered
    pub claim_min_idle: Duration,
    /// Port of the Prometheus scrape endpoint
    pub metrics_port: u16,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            consume_block: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(30),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300), // 5 minutes
            metrics_port: 8080,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: std::env::var("WORKER_MAX_JOBS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.max_concurrent_jobs),
            consume_block: defaults.consume_block,
            shutdown_timeout: Duration::from_secs(
                std::env::var("WORKER_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            claim_interval: Duration::from_secs(
                std::env::var("WORKER_CLAIM_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            claim_min_idle: Duration::from_secs(
                std::env::var("WORKER_CLAIM_MIN_IDLE_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(300),
            ),
            metrics_port: std::env::var("METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.metrics_port),
        }
    }
}
