//! Submission queue using Redis Streams.
//!
//! Each (source kind, target kind) pair has its own stream; all workers
//! share one consumer group. A message that is not acknowledged stays in the
//! group's pending list and is re-presented by `claim_pending` once it has
//! been idle long enough, which is how redelivery works.

use redis::AsyncCommands;
use tracing::{debug, info};

use xform_models::SubmissionMessage;

use crate::error::{QueueError, QueueResult};
use crate::status::STATUS_STREAM;

/// Consumer group shared by every worker.
pub const CONSUMER_GROUP: &str = "xform:transformers";

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream carrying submission messages
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Stream carrying status events
    pub status_stream: String,
}

impl QueueConfig {
    /// Default configuration for a transformer from `source` to `target`.
    pub fn for_transformer(source_kind: &str, target_kind: &str) -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: Self::stream_for(source_kind, target_kind),
            consumer_group: CONSUMER_GROUP.to_string(),
            status_stream: STATUS_STREAM.to_string(),
        }
    }

    /// Create config from environment variables.
    pub fn from_env(source_kind: &str, target_kind: &str) -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            stream_name: Self::stream_for(source_kind, target_kind),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| CONSUMER_GROUP.to_string()),
            status_stream: std::env::var("STATUS_STREAM")
                .unwrap_or_else(|_| STATUS_STREAM.to_string()),
        }
    }

    /// Stream name for a transformer pair.
    pub fn stream_for(source_kind: &str, target_kind: &str) -> String {
        format!("xform:jobs:{}_to_{}", source_kind, target_kind)
    }
}

/// A message read from the stream, not yet decoded.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Stream entry ID
    pub message_id: String,
    /// Raw `job` field
    pub payload: Vec<u8>,
}

impl Delivery {
    fn from_entry(entry: &redis::streams::StreamId) -> Self {
        let payload = match entry.map.get("job") {
            Some(redis::Value::BulkString(bytes)) => bytes.clone(),
            Some(redis::Value::SimpleString(s)) => s.clone().into_bytes(),
            // Missing field: an empty body fails decoding and gets dropped
            _ => Vec::new(),
        };
        Self {
            message_id: entry.id.clone(),
            payload,
        }
    }
}

/// Submission queue client.
pub struct JobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl JobQueue {
    /// Create a new job queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    async fn connection(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::connection_failed(e.to_string()))
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        // Create consumer group (ignore error if already exists)
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            // From the start: submissions enqueued before the first worker
            // came up are still delivered
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!("Created consumer group: {}", self.config.consumer_group),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!("Consumer group already exists: {}", self.config.consumer_group);
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Enqueue a submission message.
    pub async fn enqueue(&self, message: &SubmissionMessage) -> QueueResult<String> {
        let mut conn = self.connection().await?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(message.encode())
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        info!("Enqueued job {} with message ID {}", message.id, message_id);
        Ok(message_id)
    }

    /// Read new messages for this consumer, blocking up to `block_ms`.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.connection().await?;

        let result: Option<redis::streams::StreamReadReply> = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await?;

        let deliveries: Vec<Delivery> = result
            .map(|reply| {
                reply
                    .keys
                    .iter()
                    .flat_map(|key| key.ids.iter().map(Delivery::from_entry))
                    .collect()
            })
            .unwrap_or_default();

        if !deliveries.is_empty() {
            debug!("Consumed {} messages from {}", deliveries.len(), self.config.stream_name);
        }
        Ok(deliveries)
    }

    /// Claim messages that have been pending longer than `min_idle_ms`.
    ///
    /// Covers both messages left unacknowledged on purpose and messages
    /// held by crashed workers.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.connection().await?;

        let reply: redis::streams::StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg(min_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let deliveries: Vec<Delivery> = reply.claimed.iter().map(Delivery::from_entry).collect();
        if !deliveries.is_empty() {
            info!("Claimed {} pending messages", deliveries.len());
        }
        Ok(deliveries)
    }

    /// Acknowledge a message and remove it from the stream.
    pub async fn ack(&self, message_id: &str) -> QueueResult<()> {
        let mut conn = self.connection().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged message: {}", message_id);
        Ok(())
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.connection().await?;
        let len: u64 = conn.xlen(&self.config.stream_name).await?;
        Ok(len)
    }
}
