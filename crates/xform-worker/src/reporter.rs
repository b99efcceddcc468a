//! Status reporting for submissions.

use std::sync::Arc;

use tracing::debug;

use xform_models::{JobId, StatusEvent, SubmissionStatus};
use xform_queue::StatusPublisher;

use crate::error::PublishError;

/// Builds status events and publishes them on the status channel.
#[derive(Clone)]
pub struct StatusReporter {
    publisher: Arc<dyn StatusPublisher>,
}

impl StatusReporter {
    pub fn new(publisher: Arc<dyn StatusPublisher>) -> Self {
        Self { publisher }
    }

    /// Publish `status` for a job, stamped with the current time.
    ///
    /// `cause` becomes the event reason; without one the reason is empty.
    pub async fn report(
        &self,
        job_id: &JobId,
        status: SubmissionStatus,
        cause: Option<&str>,
    ) -> Result<StatusEvent, PublishError> {
        debug!(job_id = %job_id, "Sending {} submission status", status);

        let event = StatusEvent::now(job_id.clone(), status, cause);
        self.publisher
            .publish(&event)
            .await
            .map_err(|source| PublishError {
                job_id: job_id.to_string(),
                status: status.as_str(),
                source,
            })?;

        Ok(event)
    }
}
