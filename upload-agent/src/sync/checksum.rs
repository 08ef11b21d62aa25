//! Streaming SHA-256 content fingerprints.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::utils::errors::{Result, SyncError};

/// Read size for hashing (8 MiB).
pub const CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Lowercase hex SHA-256 of a file's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of an in-memory buffer.
    pub fn of_bytes(data: &[u8]) -> Self {
        Fingerprint(hex::encode(Sha256::digest(data)))
    }

    /// Accept an already computed digest, e.g. read back from object metadata.
    ///
    /// The value is kept verbatim: comparisons stay case-sensitive.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Fingerprint(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the fingerprint of the file at `path` in [`CHUNK_SIZE`] reads.
///
/// # Errors
/// Returns `SyncError::Io` if the file cannot be opened or read.
pub fn fingerprint(path: &Path) -> Result<Fingerprint> {
    fingerprint_with_chunk_size(path, CHUNK_SIZE)
}

pub fn fingerprint_with_chunk_size(path: &Path, chunk_size: usize) -> Result<Fingerprint> {
    let mut file = File::open(path).map_err(|e| SyncError::io(path, e))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; chunk_size.max(1)];

    loop {
        let n = file.read(&mut buffer).map_err(|e| SyncError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(Fingerprint(hex::encode(hasher.finalize())))
}
