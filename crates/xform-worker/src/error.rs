//! Worker error types.

use thiserror::Error;

use xform_queue::QueueError;
use xform_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Errors raised while setting up or running the worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Metrics exporter failed: {0}")]
    Metrics(String),

    #[error("Transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}

/// A transform rejected a file or could not process it.
///
/// The message is reported verbatim as the failure reason of the job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransformError {
    message: String,
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Step of the pipeline in which a job failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    Fetch,
    Read,
    Transform,
    Upload,
}

impl PipelinePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelinePhase::Fetch => "fetch",
            PipelinePhase::Read => "read",
            PipelinePhase::Transform => "transform",
            PipelinePhase::Upload => "upload",
        }
    }
}

impl std::fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a pipeline run failed.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to fetch submission: {0}")]
    Fetch(#[source] StorageError),

    #[error("failed to read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transform(TransformError),

    #[error("failed to upload '{path}': {source}")]
    Upload {
        path: String,
        #[source]
        source: StorageError,
    },
}

impl PipelineError {
    pub fn phase(&self) -> PipelinePhase {
        match self {
            PipelineError::Fetch(_) => PipelinePhase::Fetch,
            PipelineError::Read { .. } => PipelinePhase::Read,
            PipelineError::Transform(_) => PipelinePhase::Transform,
            PipelineError::Upload { .. } => PipelinePhase::Upload,
        }
    }
}

/// The status channel could not be reached.
///
/// Unlike pipeline failures this leads to redelivery of the job message.
#[derive(Debug, Error)]
#[error("failed to publish {status} status for job {job_id}: {source}")]
pub struct PublishError {
    pub job_id: String,
    pub status: &'static str,
    #[source]
    pub source: QueueError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transform_error_displays_its_message_only() {
        let err = PipelineError::Transform(TransformError::new("line 3: unexpected token"));
        assert_eq!(err.to_string(), "line 3: unexpected token");
        assert_eq!(err.phase(), PipelinePhase::Transform);
    }

    #[test]
    fn storage_failures_name_their_phase() {
        let fetch = PipelineError::Fetch(StorageError::not_found("subs/j1/"));
        assert_eq!(fetch.phase(), PipelinePhase::Fetch);
        assert!(fetch.to_string().starts_with("failed to fetch submission"));

        let upload = PipelineError::Upload {
            path: "a.out".to_string(),
            source: StorageError::upload_failed("503"),
        };
        assert_eq!(upload.phase(), PipelinePhase::Upload);
        assert_eq!(upload.to_string(), "failed to upload 'a.out': Upload failed: 503");
    }
}
