//! Submission transformation worker.
//!
//! This crate provides:
//! - The `Transform` seam and a command-line backed implementation
//! - The per-job pipeline (fetch, transform or pass through, upload)
//! - Status reporting and message settlement
//! - A queue executor with bounded concurrency and graceful shutdown
//! - Headless single-file mode and test helpers for transforms

pub mod config;
pub mod consumer;
pub mod error;
pub mod executor;
pub mod headless;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod reporter;
pub mod testing;
pub mod transform;

pub use config::{TransformerSpec, WorkerConfig};
pub use consumer::{Disposition, SubmissionHandler};
pub use error::{PipelineError, PipelinePhase, PublishError, TransformError, WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use headless::run_headless;
pub use logging::{init_tracing, JobLogger};
pub use pipeline::{Pipeline, PipelineReport};
pub use reporter::StatusReporter;
pub use testing::assert_transform;
pub use transform::{CommandTransform, Transform};
