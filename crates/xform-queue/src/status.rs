//! Status events on a shared Redis stream.

use async_trait::async_trait;
use tracing::{debug, error};

use xform_models::StatusEvent;

use crate::error::{QueueError, QueueResult};

/// Default stream shared by every worker for status events.
pub const STATUS_STREAM: &str = "xform:submission_status";

/// Sink for status events.
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    async fn publish(&self, event: &StatusEvent) -> QueueResult<()>;
}

/// Publishes status events as entries of a Redis stream.
///
/// Each entry carries the JSON event in its `status` field. A stream keeps
/// events around for consumers that were offline when they were published.
pub struct StatusChannel {
    client: redis::Client,
    stream_name: String,
}

impl StatusChannel {
    /// Create a new status channel.
    pub fn new(redis_url: &str, stream_name: impl Into<String>) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            stream_name: stream_name.into(),
        })
    }

    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }
}

#[async_trait]
impl StatusPublisher for StatusChannel {
    async fn publish(&self, event: &StatusEvent) -> QueueResult<()> {
        let payload = serde_json::to_string(event)?;

        let result: QueueResult<String> = async {
            let mut conn = self.client.get_multiplexed_async_connection().await?;
            let id: String = redis::cmd("XADD")
                .arg(&self.stream_name)
                .arg("*")
                .arg("status")
                .arg(&payload)
                .query_async(&mut conn)
                .await?;
            Ok::<_, QueueError>(id)
        }
        .await;

        match result {
            Ok(id) => {
                debug!(job_id = %event.id, "Published {} status as {}", event.status, id);
                Ok(())
            }
            Err(e) => {
                error!(job_id = %event.id, "Error publishing status message for job: {}", e);
                Err(QueueError::publish_failed(e.to_string()))
            }
        }
    }
}
