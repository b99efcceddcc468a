//! Object store gateway for submission files.
//!
//! This crate provides:
//! - The `ObjectStore` abstraction over list/get/put of raw objects
//! - An S3-compatible client implementation
//! - An in-memory implementation for tests and local runs
//! - `SubmissionStore`, which downloads a job's sources to scratch storage
//!   and uploads results to the result namespace

pub mod client;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod store;

pub use client::{S3Client, S3Config};
pub use error::{StorageError, StorageResult};
pub use gateway::{FetchedSubmission, StorageConfig, SubmissionStore};
pub use memory::MemoryObjectStore;
pub use store::ObjectStore;
