//! Skip-or-upload decision.
//!
//! A file is skipped only when the bucket already holds an object of the same
//! size whose stored `sha256` metadata equals the local fingerprint exactly.
//! Objects written by other tools carry no such metadata and are therefore
//! always re-uploaded; that is the intended conservative behaviour.

use crate::fs::walker::FileEntry;
use crate::storage::RemoteObjectState;
use crate::sync::checksum::Fingerprint;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Skip,
    Upload,
}

/// Decide what to do with `entry`.
///
/// `remote` is `None` when no probe was made, which is always the case with
/// skip-existing disabled.
pub fn decide(
    entry: &FileEntry,
    fingerprint: &Fingerprint,
    remote: Option<&RemoteObjectState>,
    skip_existing: bool,
) -> Decision {
    if !skip_existing {
        return Decision::Upload;
    }

    match remote {
        Some(RemoteObjectState::Present(object))
            if object.size == entry.size
                && object.stored_fingerprint.as_ref() == Some(fingerprint) =>
        {
            Decision::Skip
        }
        _ => Decision::Upload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{RemoteObject, META_SHA256};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn entry(size: u64) -> FileEntry {
        FileEntry {
            path: PathBuf::from("/data/a.csv"),
            relative_path: "a.csv".to_string(),
            size,
            mtime: 1_700_000_000,
        }
    }

    fn present(size: u64, sha: Option<&str>) -> RemoteObjectState {
        let metadata = sha
            .map(|s| HashMap::from([(META_SHA256.to_string(), s.to_string())]))
            .unwrap_or_default();
        RemoteObjectState::Present(RemoteObject::new(size, metadata))
    }

    #[test]
    fn test_matching_object_is_skipped() {
        let fp = Fingerprint::of_bytes(b"abc");
        let remote = present(3, Some(fp.as_str()));
        assert_eq!(decide(&entry(3), &fp, Some(&remote), true), Decision::Skip);
    }

    #[test]
    fn test_skip_existing_disabled_always_uploads() {
        let fp = Fingerprint::of_bytes(b"abc");
        let remote = present(3, Some(fp.as_str()));
        assert_eq!(decide(&entry(3), &fp, Some(&remote), false), Decision::Upload);
        assert_eq!(decide(&entry(3), &fp, None, false), Decision::Upload);
    }

    #[test]
    fn test_any_mismatch_forces_upload() {
        let fp = Fingerprint::of_bytes(b"abc");
        let other = Fingerprint::of_bytes(b"abd");

        let cases = [
            RemoteObjectState::Absent,
            present(4, Some(fp.as_str())),
            present(3, None),
            present(3, Some(other.as_str())),
            present(3, Some(&fp.as_str().to_uppercase())),
        ];
        for remote in &cases {
            assert_eq!(
                decide(&entry(3), &fp, Some(remote), true),
                Decision::Upload,
                "{:?}",
                remote
            );
        }
    }

    #[test]
    fn test_unprobed_with_skip_existing_uploads() {
        let fp = Fingerprint::of_bytes(b"abc");
        assert_eq!(decide(&entry(3), &fp, None, true), Decision::Upload);
    }
}
