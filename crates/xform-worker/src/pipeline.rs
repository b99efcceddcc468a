//! Submission pipeline: fetch a job's files, transform or pass each one
//! through, upload the results.
//!
//! Files are handled one at a time in the order the store listed them. The
//! first failure aborts the job; outputs uploaded before it are left in
//! place, and a later successful run overwrites them.

use std::sync::Arc;

use tracing::debug;

use xform_models::{JobId, SourceFile, TransformOutcome};
use xform_storage::SubmissionStore;

use crate::config::TransformerSpec;
use crate::error::{PipelineError, TransformError};
use crate::metrics;
use crate::transform::Transform;

/// Counts of what a successful run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub passed_through: usize,
    pub transformed: usize,
}

/// Drives one job through the gateway and the transform.
#[derive(Clone)]
pub struct Pipeline {
    store: SubmissionStore,
    transform: Arc<dyn Transform>,
    source_extension: String,
    target_extension: String,
}

impl Pipeline {
    pub fn new(store: SubmissionStore, transform: Arc<dyn Transform>, spec: &TransformerSpec) -> Self {
        Self {
            store,
            transform,
            source_extension: spec.source_extension.clone(),
            target_extension: spec.target_extension.clone(),
        }
    }

    /// Process every file of a job.
    ///
    /// Emits no status; the caller reports the outcome. Scratch storage is
    /// released before this returns, whatever the outcome.
    pub async fn process(&self, job_id: &JobId) -> Result<PipelineReport, PipelineError> {
        debug!(job_id = %job_id, "Downloading submission files...");
        let submission = self
            .store
            .fetch_all(job_id)
            .await
            .map_err(PipelineError::Fetch)?;

        let mut report = PipelineReport::default();
        for file in submission.files() {
            let outcome = self.process_file(file).await?;
            metrics::record_file_processed(outcome.kind());

            let (path, content) = match outcome {
                TransformOutcome::PassThrough(bytes) => {
                    report.passed_through += 1;
                    (file.relative_path.clone(), bytes)
                }
                TransformOutcome::Transformed(text) => {
                    report.transformed += 1;
                    let path = file.output_path(&self.source_extension, &self.target_extension);
                    (path, text.into_bytes())
                }
                TransformOutcome::Error(e) => return Err(PipelineError::Transform(e)),
            };

            debug!(job_id = %job_id, "Uploading file '{}'", path);
            if let Err(source) = self.store.upload(job_id, &path, content).await {
                return Err(PipelineError::Upload { path, source });
            }
        }

        Ok(report)
    }

    /// Decide what a single file turns into.
    async fn process_file(
        &self,
        file: &SourceFile,
    ) -> Result<TransformOutcome<TransformError>, PipelineError> {
        if !file.matches_extension(&self.source_extension) {
            debug!("Passing through file '{}'", file.relative_path);
            let bytes = tokio::fs::read(&file.local_path)
                .await
                .map_err(|source| PipelineError::Read {
                    path: file.relative_path.clone(),
                    source,
                })?;
            return Ok(TransformOutcome::PassThrough(bytes));
        }

        debug!("Transforming file '{}'", file.relative_path);
        let transform = Arc::clone(&self.transform);
        let local_path = file.local_path.clone();
        let result = tokio::task::spawn_blocking(move || transform.transform(&local_path))
            .await
            .unwrap_or_else(|e| Err(TransformError::new(format!("transform panicked: {}", e))));

        Ok(match result {
            Ok(text) => TransformOutcome::Transformed(text),
            Err(e) => TransformOutcome::Error(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use xform_storage::{MemoryObjectStore, StorageConfig};

    struct Fixture {
        memory: Arc<MemoryObjectStore>,
        store: SubmissionStore,
        work: TempDir,
    }

    fn fixture() -> Fixture {
        let work = TempDir::new().unwrap();
        let memory = Arc::new(MemoryObjectStore::new());
        let config = StorageConfig {
            submission_prefix: "subs".to_string(),
            work_dir: work.path().to_path_buf(),
        };
        let store = SubmissionStore::new(memory.clone(), config);
        Fixture { memory, store, work }
    }

    fn spec() -> TransformerSpec {
        TransformerSpec::new("src", ".src", "out", ".out")
    }

    fn job(id: &str) -> JobId {
        JobId::parse(id).unwrap()
    }

    /// Transform that records the file names it saw.
    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    impl Transform for Recording {
        fn transform(&self, path: &Path) -> Result<String, TransformError> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            self.seen.lock().unwrap().push(name.clone());
            if self.fail_on == Some(name.as_str()) {
                return Err(TransformError::new("line 3: unexpected token"));
            }
            Ok("RESULT".to_string())
        }
    }

    fn scratch_is_empty(work: &TempDir) -> bool {
        std::fs::read_dir(work.path()).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_transforms_and_passes_through() {
        let f = fixture();
        f.memory.insert("subs/j1/a.src", "source");
        f.memory.insert("subs/j1/notes.txt", vec![0u8, 159, 146, 150]);

        let pipeline = Pipeline::new(f.store.clone(), Arc::new(Recording::default()), &spec());
        let report = pipeline.process(&job("j1")).await.unwrap();

        assert_eq!(report, PipelineReport { passed_through: 1, transformed: 1 });
        assert_eq!(f.memory.get("subs-results/j1/a.out").unwrap(), b"RESULT");
        assert_eq!(
            f.memory.get("subs-results/j1/notes.txt").unwrap(),
            vec![0u8, 159, 146, 150]
        );
        assert!(f.memory.get("subs-results/j1/a.src").is_none());
        assert!(scratch_is_empty(&f.work));
    }

    #[tokio::test]
    async fn test_pure_pass_through() {
        let f = fixture();
        f.memory.insert("subs/j1/README.md", "# hi");
        f.memory.insert("subs/j1/cfg/app.toml", "x = 1");

        let transform = Arc::new(Recording::default());
        let pipeline = Pipeline::new(f.store.clone(), transform.clone(), &spec());
        pipeline.process(&job("j1")).await.unwrap();

        assert!(transform.seen.lock().unwrap().is_empty());
        assert_eq!(f.memory.get("subs-results/j1/README.md").unwrap(), b"# hi");
        assert_eq!(f.memory.get("subs-results/j1/cfg/app.toml").unwrap(), b"x = 1");
    }

    #[tokio::test]
    async fn test_first_transform_error_stops_the_job() {
        let f = fixture();
        f.memory.insert("subs/j2/a.src", "bad");
        f.memory.insert("subs/j2/b.src", "good");

        let transform = Arc::new(Recording {
            fail_on: Some("a.src"),
            ..Default::default()
        });
        let pipeline = Pipeline::new(f.store.clone(), transform.clone(), &spec());
        let err = pipeline.process(&job("j2")).await.unwrap_err();

        assert!(matches!(err, PipelineError::Transform(_)));
        assert_eq!(err.to_string(), "line 3: unexpected token");
        assert_eq!(*transform.seen.lock().unwrap(), vec!["a.src"]);
        assert!(f.memory.uploads().is_empty());
        assert!(scratch_is_empty(&f.work));
    }

    #[tokio::test]
    async fn test_earlier_uploads_are_kept_on_failure() {
        let f = fixture();
        f.memory.insert("subs/j1/a.src", "ok");
        f.memory.insert("subs/j1/b.src", "bad");
        f.memory.insert("subs/j1/c.src", "never");

        let transform = Arc::new(Recording {
            fail_on: Some("b.src"),
            ..Default::default()
        });
        let pipeline = Pipeline::new(f.store.clone(), transform, &spec());
        assert!(pipeline.process(&job("j1")).await.is_err());

        assert_eq!(f.memory.uploads(), vec!["subs-results/j1/a.out"]);
    }

    #[tokio::test]
    async fn test_empty_job_succeeds() {
        let f = fixture();
        let pipeline = Pipeline::new(f.store.clone(), Arc::new(Recording::default()), &spec());

        let report = pipeline.process(&job("nothing")).await.unwrap();
        assert_eq!(report, PipelineReport::default());
        assert!(f.memory.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_failure() {
        let f = fixture();
        f.memory.insert("subs/j1/a.src", "x");
        f.memory.fail_key("subs/j1/a.src");

        let transform = Arc::new(Recording::default());
        let pipeline = Pipeline::new(f.store.clone(), transform.clone(), &spec());
        let err = pipeline.process(&job("j1")).await.unwrap_err();

        assert_eq!(err.phase(), crate::error::PipelinePhase::Fetch);
        assert!(transform.seen.lock().unwrap().is_empty());
        assert!(scratch_is_empty(&f.work));
    }

    #[tokio::test]
    async fn test_upload_failure() {
        let f = fixture();
        f.memory.insert("subs/j1/a.src", "x");
        f.memory.fail_key("subs-results/j1/a.out");

        let pipeline = Pipeline::new(f.store.clone(), Arc::new(Recording::default()), &spec());
        let err = pipeline.process(&job("j1")).await.unwrap_err();

        assert_eq!(err.phase(), crate::error::PipelinePhase::Upload);
        assert!(scratch_is_empty(&f.work));
    }

    #[tokio::test]
    async fn test_suffix_match_has_no_boundary_check() {
        let f = fixture();
        f.memory.insert("subs/j1/notes.xsrc", "x");

        let spec = TransformerSpec::new("src", "src", "out", "out");
        let pipeline = Pipeline::new(f.store.clone(), Arc::new(Recording::default()), &spec);
        pipeline.process(&job("j1")).await.unwrap();

        assert_eq!(f.memory.get("subs-results/j1/notes.xout").unwrap(), b"RESULT");
    }

    #[tokio::test]
    async fn test_transform_panic_is_a_transform_error() {
        let f = fixture();
        f.memory.insert("subs/j1/a.src", "x");

        let panicking = |_: &Path| -> Result<String, TransformError> { panic!("boom") };
        let pipeline = Pipeline::new(f.store.clone(), Arc::new(panicking), &spec());
        let err = pipeline.process(&job("j1")).await.unwrap_err();

        assert_eq!(err.phase(), crate::error::PipelinePhase::Transform);
    }
}
