//! Job identifiers and queued job references.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a submission job.
///
/// Opaque to the worker; the only constraint is that it is not blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct JobId(String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("job id must not be empty")]
pub struct JobIdError;

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string, rejecting blank values.
    pub fn parse(s: impl Into<String>) -> Result<Self, JobIdError> {
        let s = s.into();
        if s.trim().is_empty() {
            return Err(JobIdError);
        }
        Ok(Self(s))
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for JobId {
    type Error = JobIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<JobId> for String {
    fn from(id: JobId) -> Self {
        id.0
    }
}

/// Error decoding a queued job reference.
#[derive(Debug, Error)]
#[error("malformed submission message: {0}")]
pub struct MessageDecodeError(#[from] serde_json::Error);

/// Job reference carried on the submission queue: `{ "id": "..." }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionMessage {
    pub id: JobId,
}

impl SubmissionMessage {
    pub fn new(id: JobId) -> Self {
        Self { id }
    }

    /// Decode a raw message body.
    pub fn decode(body: &[u8]) -> Result<Self, MessageDecodeError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Encode to the wire representation.
    pub fn encode(&self) -> Vec<u8> {
        // A struct holding a single string field always serializes.
        serde_json::to_vec(self).unwrap_or_default()
    }
}
