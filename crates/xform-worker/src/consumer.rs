//! Per-message handling: decode, report, process, report, settle.
//!
//! Content failures (bad input, a transform rejecting a file, missing
//! objects) are terminal: the job is reported `failed` and the message is
//! acknowledged. Only a status report that cannot be published leaves the
//! message for redelivery, because the job's outcome was never communicated.

use std::time::Instant;

use tracing::{error, Instrument};

use xform_models::{SubmissionMessage, SubmissionStatus};

use crate::logging::JobLogger;
use crate::metrics;
use crate::pipeline::Pipeline;
use crate::reporter::StatusReporter;

/// What to do with a delivered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed to a reported terminal state
    Acknowledge,
    /// Leave unacknowledged so the queue presents it again
    Redeliver,
    /// Malformed; acknowledge without processing
    Drop,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Acknowledge => "acknowledge",
            Disposition::Redeliver => "redeliver",
            Disposition::Drop => "drop",
        }
    }

    /// Whether the message is removed from the queue.
    pub fn settles(&self) -> bool {
        !matches!(self, Disposition::Redeliver)
    }
}

/// Handles one submission message at a time; safe to share across tasks.
#[derive(Clone)]
pub struct SubmissionHandler {
    pipeline: Pipeline,
    reporter: StatusReporter,
    transformer: String,
}

impl SubmissionHandler {
    /// `transformer` labels metrics and log lines, e.g. `c-go`.
    pub fn new(pipeline: Pipeline, reporter: StatusReporter, transformer: impl Into<String>) -> Self {
        Self {
            pipeline,
            reporter,
            transformer: transformer.into(),
        }
    }

    pub async fn handle(&self, body: &[u8]) -> Disposition {
        let disposition = self.handle_inner(body).await;
        metrics::record_delivery(disposition.as_str());
        disposition
    }

    async fn handle_inner(&self, body: &[u8]) -> Disposition {
        let started = Instant::now();

        let message = match SubmissionMessage::decode(body) {
            Ok(m) => m,
            Err(e) => {
                error!(body = %String::from_utf8_lossy(body), "Error decoding message: {}", e);
                return Disposition::Drop;
            }
        };
        let job_id = message.id;
        let logger = JobLogger::new(&job_id, &self.transformer);

        async {
            if let Err(e) = self
                .reporter
                .report(&job_id, SubmissionStatus::Processing, None)
                .await
            {
                logger.log_warning(&e.to_string());
                metrics::record_transform_duration(&self.transformer, SubmissionStatus::Failed, started);
                return Disposition::Redeliver;
            }

            logger.log_start("processing submission");

            match self.pipeline.process(&job_id).await {
                Ok(report) => {
                    if let Err(e) = self.reporter.report(&job_id, SubmissionStatus::Done, None).await {
                        logger.log_warning(&e.to_string());
                        metrics::record_transform_duration(&self.transformer, SubmissionStatus::Failed, started);
                        return Disposition::Redeliver;
                    }
                    metrics::record_transform_duration(&self.transformer, SubmissionStatus::Done, started);
                    logger.log_completion(&format!(
                        "{} transformed, {} passed through",
                        report.transformed, report.passed_through
                    ));
                    Disposition::Acknowledge
                }
                Err(e) => {
                    logger.log_error(&format!("{} phase failed: {}", e.phase(), e));
                    metrics::record_transform_duration(&self.transformer, SubmissionStatus::Failed, started);

                    let reason = e.to_string();
                    match self
                        .reporter
                        .report(&job_id, SubmissionStatus::Failed, Some(&reason))
                        .await
                    {
                        Ok(_) => Disposition::Acknowledge,
                        Err(publish) => {
                            logger.log_warning(&publish.to_string());
                            Disposition::Redeliver
                        }
                    }
                }
            }
        }
        .instrument(logger.create_span())
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tempfile::TempDir;
    use xform_models::StatusEvent;
    use xform_queue::{QueueError, QueueResult, StatusPublisher};
    use xform_storage::{MemoryObjectStore, StorageConfig, SubmissionStore};

    use crate::config::TransformerSpec;
    use crate::error::TransformError;

    /// Status publisher that records events and can refuse chosen statuses.
    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<StatusEvent>>,
        refuse: Mutex<HashSet<SubmissionStatus>>,
    }

    impl RecordingPublisher {
        fn refuse(&self, status: SubmissionStatus) {
            self.refuse.lock().unwrap().insert(status);
        }

        fn statuses(&self) -> Vec<SubmissionStatus> {
            self.events.lock().unwrap().iter().map(|e| e.status).collect()
        }

        fn last(&self) -> StatusEvent {
            self.events.lock().unwrap().last().cloned().unwrap()
        }
    }

    #[async_trait]
    impl StatusPublisher for RecordingPublisher {
        async fn publish(&self, event: &StatusEvent) -> QueueResult<()> {
            if self.refuse.lock().unwrap().contains(&event.status) {
                return Err(QueueError::publish_failed("status channel unreachable"));
            }
            self.events.lock().unwrap().push(event.clone());
            Ok(())
        }
    }

    struct Harness {
        memory: Arc<MemoryObjectStore>,
        publisher: Arc<RecordingPublisher>,
        calls: Arc<Mutex<Vec<String>>>,
        handler: SubmissionHandler,
        _work: TempDir,
    }

    fn harness() -> Harness {
        let work = TempDir::new().unwrap();
        let memory = Arc::new(MemoryObjectStore::new());
        let store = SubmissionStore::new(
            memory.clone(),
            StorageConfig {
                submission_prefix: "subs".to_string(),
                work_dir: work.path().to_path_buf(),
            },
        );

        let calls = Arc::new(Mutex::new(Vec::new()));
        let seen = calls.clone();
        let transform = move |path: &Path| -> Result<String, TransformError> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            seen.lock().unwrap().push(name.clone());
            if name == "a.src" && std::fs::read_to_string(path).unwrap() == "broken" {
                return Err(TransformError::new("line 3: unexpected token"));
            }
            Ok("RESULT".to_string())
        };

        let spec = TransformerSpec::new("src", ".src", "out", ".out");
        let pipeline = Pipeline::new(store, Arc::new(transform), &spec);
        let publisher = Arc::new(RecordingPublisher::default());
        let reporter = StatusReporter::new(publisher.clone());

        Harness {
            memory,
            publisher,
            calls,
            handler: SubmissionHandler::new(pipeline, reporter, spec.label()),
            _work: work,
        }
    }

    #[tokio::test]
    async fn test_successful_job() {
        let h = harness();
        h.memory.insert("subs/j1/a.src", "fine");
        h.memory.insert("subs/j1/notes.txt", "keep me");

        let disposition = h.handler.handle(br#"{"id":"j1"}"#).await;

        assert_eq!(disposition, Disposition::Acknowledge);
        assert_eq!(
            h.publisher.statuses(),
            vec![SubmissionStatus::Processing, SubmissionStatus::Done]
        );
        assert_eq!(h.publisher.last().reason, "");
        assert_eq!(h.memory.get("subs-results/j1/a.out").unwrap(), b"RESULT");
        assert_eq!(h.memory.get("subs-results/j1/notes.txt").unwrap(), b"keep me");
    }

    #[tokio::test]
    async fn test_transform_failure_is_acknowledged() {
        let h = harness();
        h.memory.insert("subs/j2/a.src", "broken");
        h.memory.insert("subs/j2/b.src", "fine");

        let disposition = h.handler.handle(br#"{"id":"j2"}"#).await;

        assert_eq!(disposition, Disposition::Acknowledge);
        assert_eq!(*h.calls.lock().unwrap(), vec!["a.src"]);
        assert!(h.memory.keys_with_prefix("subs-results/j2/").is_empty());
        assert_eq!(
            h.publisher.statuses(),
            vec![SubmissionStatus::Processing, SubmissionStatus::Failed]
        );
        let failed = h.publisher.last();
        assert_eq!(failed.id.as_str(), "j2");
        assert_eq!(failed.reason, "line 3: unexpected token");
    }

    #[tokio::test]
    async fn test_malformed_message_is_dropped_silently() {
        let h = harness();

        assert_eq!(h.handler.handle(b"{not json").await, Disposition::Drop);
        assert_eq!(h.handler.handle(br#"{"id":""}"#).await, Disposition::Drop);
        assert!(h.publisher.statuses().is_empty());
    }

    #[tokio::test]
    async fn test_processing_report_failure_redelivers_without_processing() {
        let h = harness();
        h.memory.insert("subs/j3/a.src", "fine");
        h.publisher.refuse(SubmissionStatus::Processing);

        let disposition = h.handler.handle(br#"{"id":"j3"}"#).await;

        assert_eq!(disposition, Disposition::Redeliver);
        assert!(h.calls.lock().unwrap().is_empty());
        assert!(h.memory.uploads().is_empty());
        assert!(h.publisher.statuses().is_empty());
    }

    #[tokio::test]
    async fn test_done_report_failure_redelivers() {
        let h = harness();
        h.memory.insert("subs/j4/a.src", "fine");
        h.publisher.refuse(SubmissionStatus::Done);

        let disposition = h.handler.handle(br#"{"id":"j4"}"#).await;

        assert_eq!(disposition, Disposition::Redeliver);
        assert_eq!(h.publisher.statuses(), vec![SubmissionStatus::Processing]);
    }

    #[tokio::test]
    async fn test_failed_report_failure_redelivers() {
        let h = harness();
        h.memory.insert("subs/j5/a.src", "broken");
        h.publisher.refuse(SubmissionStatus::Failed);

        let disposition = h.handler.handle(br#"{"id":"j5"}"#).await;

        assert_eq!(disposition, Disposition::Redeliver);
        assert_eq!(h.publisher.statuses(), vec![SubmissionStatus::Processing]);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_reported_and_acknowledged() {
        let h = harness();
        h.memory.insert("subs/j6/a.src", "fine");
        h.memory.fail_key("subs/j6/a.src");

        let disposition = h.handler.handle(br#"{"id":"j6"}"#).await;

        assert_eq!(disposition, Disposition::Acknowledge);
        assert_eq!(
            h.publisher.statuses(),
            vec![SubmissionStatus::Processing, SubmissionStatus::Failed]
        );
        assert!(h.publisher.last().reason.starts_with("failed to fetch submission"));
    }

    #[tokio::test]
    async fn test_redelivery_repeats_statuses() {
        let h = harness();
        h.memory.insert("subs/j7/a.src", "fine");
        h.publisher.refuse(SubmissionStatus::Done);
        assert_eq!(h.handler.handle(br#"{"id":"j7"}"#).await, Disposition::Redeliver);

        h.publisher.refuse.lock().unwrap().clear();
        assert_eq!(h.handler.handle(br#"{"id":"j7"}"#).await, Disposition::Acknowledge);

        assert_eq!(
            h.publisher.statuses(),
            vec![
                SubmissionStatus::Processing,
                SubmissionStatus::Processing,
                SubmissionStatus::Done
            ]
        );
        assert_eq!(
            h.memory.uploads(),
            vec!["subs-results/j7/a.out", "subs-results/j7/a.out"]
        );
    }

    #[test]
    fn test_only_redeliver_leaves_message_pending() {
        assert!(Disposition::Acknowledge.settles());
        assert!(Disposition::Drop.settles());
        assert!(!Disposition::Redeliver.settles());
    }
}
