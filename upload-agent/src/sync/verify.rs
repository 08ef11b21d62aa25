//! Post-upload verification against remote metadata.

use crate::storage::{probe, ObjectBackend, RemoteObjectState};
use crate::sync::checksum::Fingerprint;
use crate::utils::errors::{Result, SyncError};

/// Re-probe `key` and confirm it holds `expected_size` bytes tagged with `expected`.
///
/// # Errors
/// `SyncError::Verification` if the object is missing or its size or stored
/// fingerprint differ; `SyncError::Transport` if the probe itself fails.
pub async fn verify(
    backend: &dyn ObjectBackend,
    key: &str,
    expected_size: u64,
    expected: &Fingerprint,
) -> Result<()> {
    let failed = |reason: String| SyncError::Verification {
        key: key.to_string(),
        reason,
    };

    let object = match probe(backend, key).await? {
        RemoteObjectState::Absent => return Err(failed("object absent after upload".into())),
        RemoteObjectState::Present(object) => object,
    };

    if object.size != expected_size {
        return Err(failed(format!(
            "size mismatch: expected {} bytes, found {}",
            expected_size, object.size
        )));
    }

    match &object.stored_fingerprint {
        Some(stored) if stored == expected => Ok(()),
        Some(stored) => Err(failed(format!(
            "sha256 mismatch: expected {}, found {}",
            expected, stored
        ))),
        None => Err(failed("sha256 metadata missing".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryBackend;
    use crate::storage::META_SHA256;
    use std::collections::HashMap;

    fn meta(sha: &str) -> HashMap<String, String> {
        HashMap::from([(META_SHA256.to_string(), sha.to_string())])
    }

    #[tokio::test]
    async fn test_verify_ok() {
        let backend = MemoryBackend::new("bucket");
        let fp = Fingerprint::of_bytes(b"abc");
        backend.insert("k", &b"abc"[..], meta(fp.as_str()));
        verify(&backend, "k", 3, &fp).await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_absent() {
        let backend = MemoryBackend::new("bucket");
        let fp = Fingerprint::of_bytes(b"abc");
        let err = verify(&backend, "k", 3, &fp).await.unwrap_err();
        assert!(matches!(err, SyncError::Verification { .. }));
    }

    #[tokio::test]
    async fn test_verify_size_and_fingerprint_mismatch() {
        let backend = MemoryBackend::new("bucket");
        let fp = Fingerprint::of_bytes(b"abc");
        backend.insert("short", &b"ab"[..], meta(fp.as_str()));
        backend.insert("wrong", &b"abc"[..], meta(&"0".repeat(64)));
        backend.insert("untagged", &b"abc"[..], HashMap::new());

        for key in ["short", "wrong", "untagged"] {
            let err = verify(&backend, key, 3, &fp).await.unwrap_err();
            assert!(matches!(err, SyncError::Verification { .. }), "{}", key);
        }
    }
}
