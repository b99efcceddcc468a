//! Raw object store abstraction.

use async_trait::async_trait;

use crate::error::StorageResult;

/// Minimal object store operations the submission gateway needs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every key under `prefix`, in the store's listing order.
    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Fetch an object's bytes.
    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Write an object, replacing any existing one at `key`.
    async fn put_object(&self, key: &str, data: Vec<u8>) -> StorageResult<()>;
}
