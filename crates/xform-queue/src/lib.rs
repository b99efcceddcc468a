//! Redis Streams submission queue and status channel.
//!
//! This crate provides:
//! - Consumption of submission messages via a Redis Streams consumer group
//! - Acknowledgment and idle-message reclaiming for redelivery
//! - Status events published to a shared Redis stream

pub mod error;
pub mod queue;
pub mod status;

pub use error::{QueueError, QueueResult};
pub use queue::{Delivery, JobQueue, QueueConfig, CONSUMER_GROUP};
pub use status::{StatusChannel, StatusPublisher, STATUS_STREAM};
