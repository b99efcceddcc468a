//! Shared data models for the xform submission worker.
//!
//! This crate provides Serde-serializable types for:
//! - Job identifiers and queued job references
//! - Submission status values and status events
//! - Per-file transformation outcomes

pub mod file;
pub mod job;
pub mod status;

// Re-export common types
pub use file::{SourceFile, TransformOutcome};
pub use job::{JobId, JobIdError, MessageDecodeError, SubmissionMessage};
pub use status::{StatusEvent, SubmissionStatus};
