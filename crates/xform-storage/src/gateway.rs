//! Submission gateway: job sources in, job results out.
//!
//! Sources live under `<prefix>/<job_id>/<relative>` and results are written
//! under `<prefix>-results/<job_id>/<relative>`. Uploads overwrite, so a
//! redelivered job simply replaces earlier results. Nothing is rolled back
//! when a job fails half-way.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use tracing::{debug, info};

use xform_models::{JobId, SourceFile};

use crate::error::{StorageError, StorageResult};
use crate::store::ObjectStore;

/// Namespace and scratch-space settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Prefix of the source namespace; results go to `<prefix>-results`
    pub submission_prefix: String,
    /// Root under which per-job scratch directories are created
    pub work_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            submission_prefix: "submissions".to_string(),
            work_dir: std::env::temp_dir(),
        }
    }
}

impl StorageConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            submission_prefix: std::env::var("SUBMISSION_FOLDER_PREFIX")
                .unwrap_or_else(|_| "submissions".to_string()),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| std::env::temp_dir()),
        }
    }

    /// Key prefix holding a job's source objects.
    pub fn source_prefix(&self, job_id: &JobId) -> String {
        format!("{}/{}/", self.submission_prefix, job_id)
    }

    /// Key of a job result.
    pub fn result_key(&self, job_id: &JobId, relative_path: &str) -> String {
        format!("{}-results/{}/{}", self.submission_prefix, job_id, relative_path)
    }
}

/// A job's sources downloaded to scratch storage.
///
/// Owns the scratch directory; dropping this value deletes it along with
/// every downloaded file.
#[derive(Debug)]
pub struct FetchedSubmission {
    scratch: TempDir,
    files: Vec<SourceFile>,
}

impl FetchedSubmission {
    /// Files in the order the store listed them.
    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Scratch directory holding the downloaded files.
    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }
}

/// Gateway between the pipeline and the object store.
#[derive(Clone)]
pub struct SubmissionStore {
    store: Arc<dyn ObjectStore>,
    config: StorageConfig,
}

impl SubmissionStore {
    pub fn new(store: Arc<dyn ObjectStore>, config: StorageConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Download every object under the job's namespace.
    ///
    /// All or nothing: if any object fails to download the error is returned
    /// and the partially filled scratch directory is removed.
    pub async fn fetch_all(&self, job_id: &JobId) -> StorageResult<FetchedSubmission> {
        let prefix = self.config.source_prefix(job_id);
        let keys = self.store.list_keys(&prefix).await?;

        tokio::fs::create_dir_all(&self.config.work_dir).await?;
        let work_dir = self.config.work_dir.clone();
        let prefix_name = scratch_prefix(job_id);
        let scratch = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new()
                .prefix(&prefix_name)
                .tempdir_in(&work_dir)
        })
        .await
        .map_err(|e| StorageError::Scratch(format!("Temp dir task failed: {}", e)))?
        .map_err(|e| StorageError::Scratch(format!("Failed to create temp dir: {}", e)))?;

        let mut files = Vec::with_capacity(keys.len());
        for key in keys {
            let relative = match key.strip_prefix(&prefix) {
                Some(r) if !r.is_empty() && !r.ends_with('/') => r.to_string(),
                // Folder placeholders carry no content
                _ => continue,
            };
            let local_path = scratch.path().join(safe_relative_path(&relative)?);
            self.download_to(&key, &local_path).await?;
            files.push(SourceFile::new(relative, local_path));
        }

        info!(job_id = %job_id, "Fetched {} source files", files.len());
        Ok(FetchedSubmission { scratch, files })
    }

    async fn download_to(&self, key: &str, path: &Path) -> StorageResult<()> {
        debug!("Downloading file '{}' to '{}'", key, path.display());

        let bytes = self.store.get_object(key).await?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                StorageError::download_failed(format!("Failed to create directory: {}", e))
            })?;
        }

        tokio::fs::write(path, bytes).await.map_err(|e| {
            StorageError::download_failed(format!(
                "Failed to copy object to '{}': {}",
                path.display(),
                e
            ))
        })
    }

    /// Write a result, overwriting whatever is already there.
    pub async fn upload(
        &self,
        job_id: &JobId,
        relative_path: &str,
        content: Vec<u8>,
    ) -> StorageResult<()> {
        let key = self.config.result_key(job_id, relative_path);
        debug!("Uploading file '{}' to '{}'", relative_path, key);
        self.store.put_object(&key, content).await
    }
}

/// Scratch directory name prefix for a job.
///
/// Job ids are arbitrary strings; anything outside `[A-Za-z0-9_-]` becomes
/// `_` so the directory always lands directly under the work dir.
fn scratch_prefix(job_id: &JobId) -> String {
    let safe: String = job_id
        .as_str()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    format!("{}-", safe)
}

/// Reject object names that would escape the scratch directory.
fn safe_relative_path(relative: &str) -> StorageResult<PathBuf> {
    let path = Path::new(relative);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(StorageError::invalid_key(relative));
    }
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryObjectStore;

    fn setup() -> (Arc<MemoryObjectStore>, SubmissionStore, TempDir) {
        let work = TempDir::new().unwrap();
        let memory = Arc::new(MemoryObjectStore::new());
        let config = StorageConfig {
            submission_prefix: "subs".to_string(),
            work_dir: work.path().to_path_buf(),
        };
        let gateway = SubmissionStore::new(memory.clone(), config);
        (memory, gateway, work)
    }

    fn job(id: &str) -> JobId {
        JobId::parse(id).unwrap()
    }

    #[test]
    fn test_namespaces() {
        let config = StorageConfig {
            submission_prefix: "subs".to_string(),
            work_dir: PathBuf::from("/tmp"),
        };
        assert_eq!(config.source_prefix(&job("j1")), "subs/j1/");
        assert_eq!(config.result_key(&job("j1"), "a/b.out"), "subs-results/j1/a/b.out");
    }

    #[tokio::test]
    async fn test_fetch_all_materializes_files() {
        let (memory, gateway, _work) = setup();
        memory.insert("subs/j1/a.src", "int main;");
        memory.insert("subs/j1/lib/notes.txt", "hello");
        memory.insert("subs/j2/other.src", "nope");

        let fetched = gateway.fetch_all(&job("j1")).await.unwrap();
        let relative: Vec<_> = fetched.files().iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(relative, vec!["a.src", "lib/notes.txt"]);

        for file in fetched.files() {
            assert!(file.local_path.starts_with(fetched.scratch_dir()));
        }
        let notes = tokio::fs::read(&fetched.files()[1].local_path).await.unwrap();
        assert_eq!(notes, b"hello");
    }

    #[tokio::test]
    async fn test_scratch_released_on_drop() {
        let (memory, gateway, _work) = setup();
        memory.insert("subs/j1/a.src", "x");

        let fetched = gateway.fetch_all(&job("j1")).await.unwrap();
        let dir = fetched.scratch_dir().to_path_buf();
        assert!(dir.exists());

        drop(fetched);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_fetch_all_is_atomic() {
        let (memory, gateway, work) = setup();
        memory.insert("subs/j1/a.src", "x");
        memory.insert("subs/j1/b.src", "y");
        memory.fail_key("subs/j1/b.src");

        let result = gateway.fetch_all(&job("j1")).await;
        assert!(matches!(result, Err(StorageError::DownloadFailed(_))));

        // Nothing left behind in the work dir
        let mut entries = std::fs::read_dir(work.path()).unwrap();
        assert!(entries.next().is_none());
    }

    #[tokio::test]
    async fn test_fetch_empty_job() {
        let (_memory, gateway, _work) = setup();
        let fetched = gateway.fetch_all(&job("empty")).await.unwrap();
        assert!(fetched.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_skips_folder_markers() {
        let (memory, gateway, _work) = setup();
        memory.insert("subs/j1/dir/", "");
        memory.insert("subs/j1/dir/a.src", "x");

        let fetched = gateway.fetch_all(&job("j1")).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched.files()[0].relative_path, "dir/a.src");
    }

    #[tokio::test]
    async fn test_fetch_rejects_escaping_keys() {
        let (memory, gateway, _work) = setup();
        memory.insert("subs/j1/../escape.src", "x");

        let result = gateway.fetch_all(&job("j1")).await;
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
    }

    #[tokio::test]
    async fn test_scratch_stays_in_work_dir_for_any_job_id() {
        let (memory, gateway, work) = setup();

        for id in ["team/42", "../esc"] {
            memory.insert(format!("subs/{}/a.src", id), "x");

            let fetched = gateway.fetch_all(&job(id)).await.unwrap();
            assert_eq!(fetched.len(), 1);
            assert_eq!(fetched.scratch_dir().parent().unwrap(), work.path());
            let name = fetched.scratch_dir().file_name().unwrap().to_string_lossy().to_string();
            assert!(!name.contains('/') && !name.contains(".."), "{}", name);
        }
    }

    #[test]
    fn test_scratch_prefix_replaces_unsafe_characters() {
        assert_eq!(scratch_prefix(&job("team/42")), "team_42-");
        assert_eq!(scratch_prefix(&job("../esc")), "___esc-");
        assert_eq!(scratch_prefix(&job("Job_1-a")), "Job_1-a-");
    }

    #[tokio::test]
    async fn test_upload_writes_result_namespace() {
        let (memory, gateway, _work) = setup();
        gateway.upload(&job("j1"), "a.out", b"first".to_vec()).await.unwrap();
        gateway.upload(&job("j1"), "a.out", b"second".to_vec()).await.unwrap();

        assert_eq!(memory.get("subs-results/j1/a.out").unwrap(), b"second");
    }
}
