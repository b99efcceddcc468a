//! Submission status values and the events published for them.
//!
//! Consumers of the status stream must treat the latest event for a job as
//! authoritative: redelivery can repeat `processing` or a terminal status.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::JobId;

/// Submission processing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
    /// Set by the submitter before any worker runs
    Pending,
    /// A worker picked the job up
    Processing,
    /// All files were processed and uploaded
    Done,
    /// The job failed; see the event reason
    Failed,
}

impl SubmissionStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStatus::Pending => "pending",
            SubmissionStatus::Processing => "processing",
            SubmissionStatus::Done => "done",
            SubmissionStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionStatus::Done | SubmissionStatus::Failed)
    }
}

impl std::fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status event published on the shared status channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    /// Job ID
    pub id: JobId,
    /// Reported status
    pub status: SubmissionStatus,
    /// Failure reason, empty unless something went wrong
    #[serde(default)]
    pub reason: String,
    /// Emission time in milliseconds since the Unix epoch
    pub timestamp: i64,
}

impl StatusEvent {
    /// Build an event stamped with the current time.
    pub fn now(id: JobId, status: SubmissionStatus, reason: Option<&str>) -> Self {
        Self {
            id,
            status,
            reason: reason.map(str::to_owned).unwrap_or_default(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}
