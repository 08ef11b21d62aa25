//! Append-only SHA-256 manifest.
//!
//! One line per file that reached a terminal outcome, in processing order:
//! `<64 hex chars>  <key>\n`. The same key may appear in many runs; the file is
//! a history, not an index.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, LineWriter, Write};
use std::path::{Path, PathBuf};

use crate::sync::checksum::Fingerprint;
use crate::utils::errors::{Result, SyncError};

const SEPARATOR: &str = "  ";

/// One manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRecord {
    pub fingerprint: Fingerprint,
    pub key: String,
}

impl ManifestRecord {
    pub fn to_line(&self) -> String {
        format!("{}{}{}\n", self.fingerprint, SEPARATOR, self.key)
    }

    /// Parse a line without its trailing newline.
    pub fn parse_line(line: &str) -> Option<Self> {
        let (fingerprint, key) = line.split_once(SEPARATOR)?;
        if fingerprint.len() != 64 || !fingerprint.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self {
            fingerprint: Fingerprint::from_hex(fingerprint),
            key: key.to_string(),
        })
    }
}

/// Writer held for the duration of a run.
///
/// Lines are flushed as they are written and again on drop, so an early
/// return never loses records already appended.
pub struct ManifestWriter {
    path: Option<PathBuf>,
    out: Option<LineWriter<File>>,
    written: usize,
}

impl ManifestWriter {
    /// Open `path` for appending, creating it if needed. `None` disables the manifest.
    ///
    /// # Errors
    /// `SyncError::Manifest` if the file cannot be opened.
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let out = match path {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(SyncError::Manifest)?;
                Some(LineWriter::new(file))
            }
            None => None,
        };

        Ok(Self {
            path: path.map(Path::to_path_buf),
            out,
            written: 0,
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.out.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Lines appended by this writer.
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn append(&mut self, fingerprint: &Fingerprint, key: &str) -> Result<()> {
        let Some(out) = self.out.as_mut() else {
            return Ok(());
        };

        let record = ManifestRecord {
            fingerprint: fingerprint.clone(),
            key: key.to_string(),
        };
        out.write_all(record.to_line().as_bytes())
            .map_err(SyncError::Manifest)?;
        self.written += 1;
        Ok(())
    }

    /// Flush and close, reporting any error.
    pub fn finish(mut self) -> Result<()> {
        if let Some(mut out) = self.out.take() {
            out.flush().map_err(SyncError::Manifest)?;
            out.get_ref().sync_all().map_err(SyncError::Manifest)?;
        }
        Ok(())
    }
}

impl Drop for ManifestWriter {
    fn drop(&mut self) {
        if let Some(out) = self.out.as_mut() {
            if let Err(e) = out.flush() {
                tracing::warn!("Failed to flush manifest: {}", e);
            }
        }
    }
}

/// Read every well-formed record from a manifest file.
pub fn read_manifest(path: &Path) -> Result<Vec<ManifestRecord>> {
    let file = File::open(path).map_err(|e| SyncError::io(path, e))?;
    let mut records = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line.map_err(|e| SyncError::io(path, e))?;
        match ManifestRecord::parse_line(&line) {
            Some(record) => records.push(record),
            None => tracing::warn!("Ignoring malformed manifest line: {}", line),
        }
    }
    Ok(records)
}
