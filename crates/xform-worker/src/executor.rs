//! Job executor: pulls messages from the queue and runs them through the
//! submission handler with bounded concurrency.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use xform_queue::{Delivery, JobQueue};

use crate::config::WorkerConfig;
use crate::consumer::SubmissionHandler;
use crate::error::WorkerResult;

/// Job executor that processes messages from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    handler: Arc<SubmissionHandler>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    /// Create a new job executor.
    pub fn new(config: WorkerConfig, queue: JobQueue, handler: SubmissionHandler) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            handler: Arc::new(handler),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Start the executor. Returns once `shutdown` has been signalled and
    /// in-flight jobs have finished or the shutdown timeout elapsed.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            "Starting job executor '{}' on {} with {} max concurrent jobs",
            self.consumer_name,
            self.queue.config().stream_name,
            self.config.max_concurrent_jobs
        );

        self.queue.init().await?;

        let claim_task = tokio::spawn(Self::claim_loop(
            Arc::clone(&self.queue),
            Arc::clone(&self.handler),
            Arc::clone(&self.job_semaphore),
            self.consumer_name.clone(),
            self.config.clone(),
            self.shutdown.subscribe(),
        ));

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => {
                    if let Err(e) = result {
                        error!("Error consuming jobs: {}", e);
                        // Back off on error
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        claim_task.abort();

        info!("Waiting for in-flight jobs to complete...");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!("Shutdown timeout elapsed with jobs still running; they will be redelivered");
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Consume and dispatch messages from the queue.
    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            // All slots busy, wait a bit
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = self
            .queue
            .consume(
                &self.consumer_name,
                self.config.consume_block.as_millis() as u64,
                available,
            )
            .await?;

        if deliveries.is_empty() {
            return Ok(());
        }
        debug!("Consumed {} messages from queue", deliveries.len());

        Self::dispatch(&self.queue, &self.handler, &self.job_semaphore, deliveries).await;
        Ok(())
    }

    /// Periodically re-present messages left pending for longer than the
    /// visibility timeout.
    async fn claim_loop(
        queue: Arc<JobQueue>,
        handler: Arc<SubmissionHandler>,
        semaphore: Arc<Semaphore>,
        consumer_name: String,
        config: WorkerConfig,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(config.claim_interval);
        let min_idle_ms = config.claim_min_idle.as_millis() as u64;

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    let available = semaphore.available_permits();
                    if available == 0 {
                        continue;
                    }
                    match queue.claim_pending(&consumer_name, min_idle_ms, available).await {
                        Ok(deliveries) if !deliveries.is_empty() => {
                            Self::dispatch(&queue, &handler, &semaphore, deliveries).await;
                        }
                        Ok(_) => {}
                        Err(e) => warn!("Failed to claim pending messages: {}", e),
                    }
                }
            }
        }
    }

    /// Spawn one task per delivery, each holding a semaphore permit.
    async fn dispatch(
        queue: &Arc<JobQueue>,
        handler: &Arc<SubmissionHandler>,
        semaphore: &Arc<Semaphore>,
        deliveries: Vec<Delivery>,
    ) {
        for delivery in deliveries {
            let permit = match Arc::clone(semaphore).acquire_owned().await {
                Ok(p) => p,
                // Closed by shutdown; the rest stay pending for redelivery
                Err(_) => {
                    debug!("Executor shutting down, leaving message {} pending", delivery.message_id);
                    break;
                }
            };
            let queue = Arc::clone(queue);
            let handler = Arc::clone(handler);

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute(&queue, &handler, delivery).await;
            });
        }
    }

    /// Handle one delivery and settle it with the queue.
    async fn execute(queue: &JobQueue, handler: &SubmissionHandler, delivery: Delivery) {
        let disposition = handler.handle(&delivery.payload).await;

        if disposition.settles() {
            if let Err(e) = queue.ack(&delivery.message_id).await {
                // Left pending; the claim loop will present it again
                error!("Failed to ack message {}: {}", delivery.message_id, e);
            }
        } else {
            info!(
                "Message {} left pending for redelivery",
                delivery.message_id
            );
        }
    }

    /// Wait for all in-flight jobs to complete.
    async fn wait_for_jobs(&self) {
        while self.job_semaphore.available_permits() < self.config.max_concurrent_jobs {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Signal shutdown. No new deliveries are started after this returns.
    pub fn shutdown(&self) {
        self.job_semaphore.close();
        let _ = self.shutdown.send(true);
    }
}
