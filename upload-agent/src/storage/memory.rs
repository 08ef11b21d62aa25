//! In-memory object backend.
//!
//! Behaves like a bucket that honours user metadata and multipart uploads,
//! and can be told to fail specific operations. Counters expose how many
//! mutating calls were made and how many parts were in flight at once.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use crate::storage::{
    MultipartSession, ObjectBackend, PartFuture, RemoteObject, RemoteObjectState, UploadOptions,
    META_SHA256,
};
use crate::utils::errors::{Result, SyncError};

/// An object held by [`MemoryBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub data: Bytes,
    pub metadata: HashMap<String, String>,
    pub storage_class: Option<String>,
    /// Number of parts, or `None` for a single-request put.
    pub parts: Option<usize>,
}

#[derive(Default)]
struct Faults {
    head: HashSet<String>,
    put: HashSet<String>,
    /// Keys whose stored fingerprint is replaced after a successful write.
    tamper: HashSet<String>,
    /// Fail the part with this index (0-based, per upload).
    part: Option<usize>,
}

#[derive(Default)]
struct Inner {
    objects: Mutex<HashMap<String, StoredObject>>,
    faults: Mutex<Faults>,
    heads: AtomicUsize,
    writes: AtomicUsize,
    parts: AtomicUsize,
    parts_in_flight: AtomicUsize,
    max_parts_in_flight: AtomicUsize,
    aborts: AtomicUsize,
}

/// Bucket kept in process memory. Clones share state.
#[derive(Clone)]
pub struct MemoryBackend {
    bucket: String,
    inner: Arc<Inner>,
    part_delay: Duration,
}

impl MemoryBackend {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            inner: Arc::new(Inner::default()),
            part_delay: Duration::from_millis(2),
        }
    }

    /// Make `head` for `key` fail with a transport error.
    pub fn fail_heads_for(&self, key: &str) {
        self.faults().head.insert(key.to_string());
    }

    /// Make single and multipart puts for `key` fail with a transport error.
    pub fn fail_puts_for(&self, key: &str) {
        self.faults().put.insert(key.to_string());
    }

    /// Accept writes to `key` but store a wrong fingerprint.
    pub fn tamper_with(&self, key: &str) {
        self.faults().tamper.insert(key.to_string());
    }

    /// Fail the `index`-th part (0-based) of every multipart upload.
    pub fn fail_part(&self, index: usize) {
        self.faults().part = Some(index);
    }

    /// Store an object directly, bypassing counters.
    pub fn insert(&self, key: &str, data: impl Into<Bytes>, metadata: HashMap<String, String>) {
        self.objects().insert(
            key.to_string(),
            StoredObject {
                data: data.into(),
                metadata,
                storage_class: None,
                parts: None,
            },
        );
    }

    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of `head` calls.
    pub fn head_calls(&self) -> usize {
        self.inner.heads.load(Ordering::SeqCst)
    }

    /// Number of mutating calls: single puts plus multipart starts.
    pub fn write_calls(&self) -> usize {
        self.inner.writes.load(Ordering::SeqCst)
    }

    /// Number of part uploads attempted.
    pub fn part_calls(&self) -> usize {
        self.inner.parts.load(Ordering::SeqCst)
    }

    /// Highest number of part uploads observed running at the same time.
    pub fn max_parts_in_flight(&self) -> usize {
        self.inner.max_parts_in_flight.load(Ordering::SeqCst)
    }

    pub fn abort_calls(&self) -> usize {
        self.inner.aborts.load(Ordering::SeqCst)
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<String, StoredObject>> {
        self.inner
            .objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn faults(&self) -> MutexGuard<'_, Faults> {
        self.inner
            .faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn check_put(&self, key: &str) -> Result<()> {
        if self.faults().put.contains(key) {
            return Err(SyncError::transport(key, "injected put failure (503 Slow Down)"));
        }
        Ok(())
    }

    fn store(&self, key: &str, data: Bytes, options: &UploadOptions, parts: Option<usize>) {
        let mut metadata = options.metadata.clone();
        if self.faults().tamper.contains(key) {
            metadata.insert(META_SHA256.to_string(), "0".repeat(64));
        }
        self.objects().insert(
            key.to_string(),
            StoredObject {
                data,
                metadata,
                storage_class: options.storage_class.clone(),
                parts,
            },
        );
    }
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn head(&self, key: &str) -> Result<RemoteObjectState> {
        self.inner.heads.fetch_add(1, Ordering::SeqCst);
        if self.faults().head.contains(key) {
            return Err(SyncError::transport(key, "injected head failure (403 Forbidden)"));
        }

        Ok(match self.objects().get(key) {
            Some(object) => RemoteObjectState::Present(RemoteObject::new(
                object.data.len() as u64,
                object.metadata.clone(),
            )),
            None => RemoteObjectState::Absent,
        })
    }

    async fn put_object(&self, key: &str, data: Bytes, options: &UploadOptions) -> Result<()> {
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        self.check_put(key)?;
        self.store(key, data, options, None);
        Ok(())
    }

    async fn start_multipart(
        &self,
        key: &str,
        options: &UploadOptions,
    ) -> Result<Box<dyn MultipartSession>> {
        self.inner.writes.fetch_add(1, Ordering::SeqCst);
        self.check_put(key)?;
        Ok(Box::new(MemoryMultipart {
            backend: self.clone(),
            key: key.to_string(),
            options: options.clone(),
            parts: Arc::new(Mutex::new(Vec::new())),
            next_index: 0,
        }))
    }
}

struct MemoryMultipart {
    backend: MemoryBackend,
    key: String,
    options: UploadOptions,
    parts: Arc<Mutex<Vec<Option<Bytes>>>>,
    next_index: usize,
}

#[async_trait]
impl MultipartSession for MemoryMultipart {
    fn put_part(&mut self, data: Bytes) -> PartFuture {
        let index = self.next_index;
        self.next_index += 1;
        if let Ok(mut parts) = self.parts.lock() {
            parts.push(None);
        }

        let inner = Arc::clone(&self.backend.inner);
        let parts = Arc::clone(&self.parts);
        let fail = self.backend.faults().part == Some(index);
        let key = self.key.clone();
        let delay = self.backend.part_delay;

        Box::pin(async move {
            inner.parts.fetch_add(1, Ordering::SeqCst);
            let now = inner.parts_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            inner.max_parts_in_flight.fetch_max(now, Ordering::SeqCst);

            tokio::time::sleep(delay).await;
            inner.parts_in_flight.fetch_sub(1, Ordering::SeqCst);

            if fail {
                return Err(SyncError::transport(
                    key,
                    format!("injected failure for part {}", index + 1),
                ));
            }
            if let Ok(mut parts) = parts.lock() {
                if let Some(slot) = parts.get_mut(index) {
                    *slot = Some(data);
                }
            }
            Ok(())
        })
    }

    async fn complete(&mut self) -> Result<()> {
        let parts = self
            .parts
            .lock()
            .map_err(|_| SyncError::transport(&self.key, "part list poisoned"))?
            .clone();

        let mut data = BytesMut::new();
        for (index, part) in parts.iter().enumerate() {
            match part {
                Some(bytes) => data.extend_from_slice(bytes),
                None => {
                    return Err(SyncError::transport(
                        &self.key,
                        format!("part {} missing at completion", index + 1),
                    ))
                }
            }
        }

        self.backend
            .store(&self.key, data.freeze(), &self.options, Some(parts.len()));
        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        self.backend.inner.aborts.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut parts) = self.parts.lock() {
            parts.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_head_round_trip_metadata() {
        let backend = MemoryBackend::new("bucket");
        let options = UploadOptions {
            metadata: HashMap::from([("sha256".to_string(), "abc".to_string())]),
            storage_class: Some("GLACIER".to_string()),
        };
        backend
            .put_object("k", Bytes::from_static(b"data"), &options)
            .await
            .unwrap();

        let stored = backend.get("k").unwrap();
        assert_eq!(stored.storage_class.as_deref(), Some("GLACIER"));
        assert_eq!(backend.write_calls(), 1);
        assert!(matches!(
            backend.head("k").await.unwrap(),
            RemoteObjectState::Present(RemoteObject { size: 4, .. })
        ));
    }

    #[tokio::test]
    async fn test_multipart_assembles_parts_in_call_order() {
        let backend = MemoryBackend::new("bucket");
        let mut session = backend
            .start_multipart("big", &UploadOptions::default())
            .await
            .unwrap();

        let first = session.put_part(Bytes::from_static(b"hello "));
        let second = session.put_part(Bytes::from_static(b"world"));
        second.await.unwrap();
        first.await.unwrap();
        session.complete().await.unwrap();

        let stored = backend.get("big").unwrap();
        assert_eq!(stored.data, Bytes::from_static(b"hello world"));
        assert_eq!(stored.parts, Some(2));
    }

    #[tokio::test]
    async fn test_injected_put_failure() {
        let backend = MemoryBackend::new("bucket");
        backend.fail_puts_for("bad");
        let result = backend
            .put_object("bad", Bytes::new(), &UploadOptions::default())
            .await;
        assert!(matches!(result, Err(SyncError::Transport { .. })));
        assert!(backend.get("bad").is_none());
    }
}
