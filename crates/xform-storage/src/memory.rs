//! In-process object store.
//!
//! Keeps objects in a sorted map, so listing order is lexicographic like S3.
//! Keys can be marked as failing to simulate an unreachable or broken store.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};
use crate::store::ObjectStore;

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<String, Vec<u8>>,
    failing_keys: HashSet<String>,
    fail_listing: bool,
    uploads: Vec<String>,
}

/// Object store backed by memory.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    inner: Mutex<Inner>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store an object directly.
    pub fn insert(&self, key: impl Into<String>, data: impl Into<Vec<u8>>) {
        self.lock().objects.insert(key.into(), data.into());
    }

    /// Read an object directly.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(key).cloned()
    }

    /// All keys currently stored under `prefix`.
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.lock()
            .objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Keys written through `put_object`, in call order.
    pub fn uploads(&self) -> Vec<String> {
        self.lock().uploads.clone()
    }

    /// Make reads and writes of `key` fail.
    pub fn fail_key(&self, key: impl Into<String>) {
        self.lock().failing_keys.insert(key.into());
    }

    /// Make listing fail.
    pub fn fail_listing(&self) {
        self.lock().fail_listing = true;
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        if self.lock().fail_listing {
            return Err(StorageError::ListFailed(format!("listing {} refused", prefix)));
        }
        Ok(self.keys_with_prefix(prefix))
    }

    async fn get_object(&self, key: &str) -> StorageResult<Vec<u8>> {
        let inner = self.lock();
        if inner.failing_keys.contains(key) {
            return Err(StorageError::download_failed(format!("{} unavailable", key)));
        }
        inner
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::not_found(key))
    }

    async fn put_object(&self, key: &str, data: Vec<u8>) -> StorageResult<()> {
        let mut inner = self.lock();
        if inner.failing_keys.contains(key) {
            return Err(StorageError::upload_failed(format!("{} unavailable", key)));
        }
        inner.uploads.push(key.to_string());
        inner.objects.insert(key.to_string(), data);
        Ok(())
    }
}
