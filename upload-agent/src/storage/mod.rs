//! Object storage abstraction.
//!
//! The rest of the agent talks to a bucket only through [`ObjectBackend`]:
//! a metadata lookup, a single-request put and a multipart session. The S3
//! backend lives in [`s3`], an in-memory one in [`memory`].

pub mod memory;
pub mod profile;
pub mod s3;

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::future::BoxFuture;

use crate::sync::checksum::Fingerprint;
use crate::utils::errors::Result;

/// User metadata key holding the content fingerprint.
pub const META_SHA256: &str = "sha256";
/// User metadata key holding the source file mtime (epoch seconds).
pub const META_SRC_MTIME: &str = "src-mtime";
/// User metadata key holding the source file size in bytes.
pub const META_SRC_BYTES: &str = "src-bytes";

/// What the bucket holds under a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteObjectState {
    Absent,
    Present(RemoteObject),
}

/// Facts about an existing object, recovered without reading its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub size: u64,
    /// Fingerprint recorded by a previous upload, if the writer set one.
    pub stored_fingerprint: Option<Fingerprint>,
    /// All user metadata on the object.
    pub metadata: HashMap<String, String>,
}

impl RemoteObject {
    /// Build from a size and a user metadata map, extracting the fingerprint.
    pub fn new(size: u64, metadata: HashMap<String, String>) -> Self {
        let stored_fingerprint = metadata.get(META_SHA256).map(Fingerprint::from_hex);
        Self {
            size,
            stored_fingerprint,
            metadata,
        }
    }
}

/// Per-object settings for a put.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadOptions {
    pub metadata: HashMap<String, String>,
    pub storage_class: Option<String>,
}

impl UploadOptions {
    /// Metadata every uploaded object carries: fingerprint, source mtime and size.
    pub fn for_file(
        fingerprint: &Fingerprint,
        mtime: i64,
        size: u64,
        storage_class: Option<String>,
    ) -> Self {
        let metadata = HashMap::from([
            (META_SHA256.to_string(), fingerprint.as_str().to_string()),
            (META_SRC_MTIME.to_string(), mtime.to_string()),
            (META_SRC_BYTES.to_string(), size.to_string()),
        ]);
        Self {
            metadata,
            storage_class,
        }
    }
}

/// Future for one part upload. Owns everything it needs so several can be in flight.
pub type PartFuture = BoxFuture<'static, Result<()>>;

/// Storage capability used by the probe, the transfer engine and the verifier.
///
/// Implementations must be safe to share across concurrently running part uploads.
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// Bucket this backend writes to, for log lines.
    fn bucket(&self) -> &str;

    /// Metadata lookup. A definitive not-found is `Ok(Absent)`; anything else
    /// that is not a success is `SyncError::Transport`.
    async fn head(&self, key: &str) -> Result<RemoteObjectState>;

    /// Store `data` under `key` in one request.
    async fn put_object(&self, key: &str, data: Bytes, options: &UploadOptions) -> Result<()>;

    /// Begin a multipart upload for `key`.
    async fn start_multipart(
        &self,
        key: &str,
        options: &UploadOptions,
    ) -> Result<Box<dyn MultipartSession>>;
}

/// An open multipart upload.
///
/// Parts are numbered in the order `put_part` is called, regardless of the
/// order their futures complete in.
#[async_trait]
pub trait MultipartSession: Send {
    fn put_part(&mut self, data: Bytes) -> PartFuture;

    /// Assemble the uploaded parts into the final object.
    async fn complete(&mut self) -> Result<()>;

    /// Discard uploaded parts.
    async fn abort(&mut self) -> Result<()>;
}

/// Query remote state for `key` without transferring content.
pub async fn probe(backend: &dyn ObjectBackend, key: &str) -> Result<RemoteObjectState> {
    let state = backend.head(key).await?;
    match &state {
        RemoteObjectState::Absent => {
            tracing::debug!("s3://{}/{} not found", backend.bucket(), key)
        }
        RemoteObjectState::Present(object) => tracing::debug!(
            "s3://{}/{} present, {} bytes, sha256 {}",
            backend.bucket(),
            key,
            object.size,
            object
                .stored_fingerprint
                .as_ref()
                .map(Fingerprint::as_str)
                .unwrap_or("<none>")
        ),
    }
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_options_metadata() {
        let fp = Fingerprint::of_bytes(b"abc");
        let options = UploadOptions::for_file(&fp, 1_700_000_000, 3, Some("STANDARD_IA".into()));

        assert_eq!(options.metadata.get(META_SHA256), Some(&fp.to_string()));
        assert_eq!(
            options.metadata.get(META_SRC_MTIME).map(String::as_str),
            Some("1700000000")
        );
        assert_eq!(options.metadata.get(META_SRC_BYTES).map(String::as_str), Some("3"));
        assert_eq!(options.storage_class.as_deref(), Some("STANDARD_IA"));
    }

    #[test]
    fn test_remote_object_extracts_fingerprint() {
        let with = RemoteObject::new(
            10,
            HashMap::from([(META_SHA256.to_string(), "ab".to_string())]),
        );
        assert_eq!(with.stored_fingerprint, Some(Fingerprint::from_hex("ab")));

        let without = RemoteObject::new(10, HashMap::new());
        assert!(without.stored_fingerprint.is_none());
    }

    #[tokio::test]
    async fn test_probe_reports_absent_and_present() {
        let backend = memory::MemoryBackend::new("bucket");
        assert_eq!(
            probe(&backend, "missing.csv").await.unwrap(),
            RemoteObjectState::Absent
        );

        let fp = Fingerprint::of_bytes(b"payload");
        backend
            .put_object(
                "present.csv",
                Bytes::from_static(b"payload"),
                &UploadOptions::for_file(&fp, 1, 7, None),
            )
            .await
            .unwrap();

        match probe(&backend, "present.csv").await.unwrap() {
            RemoteObjectState::Present(object) => {
                assert_eq!(object.size, 7);
                assert_eq!(object.stored_fingerprint, Some(fp));
            }
            RemoteObjectState::Absent => panic!("expected object to be present"),
        }
    }

    #[tokio::test]
    async fn test_probe_propagates_transport_errors() {
        let backend = memory::MemoryBackend::new("bucket");
        backend.fail_heads_for("flaky.csv");
        let result = probe(&backend, "flaky.csv").await;
        assert!(matches!(
            result,
            Err(crate::utils::errors::SyncError::Transport { .. })
        ));
    }
}
