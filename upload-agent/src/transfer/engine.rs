//! Content upload with multipart splitting for large files.
//!
//! Files below the multipart threshold go out in one request. Larger files are
//! read part by part and at most `concurrency` parts are in flight at once, so
//! peak memory per file is roughly `concurrency * part_size`. The whole file
//! either lands or the upload is aborted.

use std::path::Path;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::stream::{FuturesUnordered, StreamExt};
use futures_util::FutureExt;
use tokio::io::AsyncReadExt;
use tracing::{debug, warn};

use crate::storage::{MultipartSession, ObjectBackend, UploadOptions};
use crate::transfer::progress::{format_bytes, NoProgress, ProgressObserver};
use crate::utils::errors::{Result, SyncError};

/// Default multipart threshold (8 MiB).
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 8 * 1024 * 1024;
/// Default part size (8 MiB).
pub const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024;
/// Default number of parts in flight.
pub const DEFAULT_CONCURRENCY: usize = 8;
/// Most parts S3 accepts in one multipart upload.
pub const MAX_PARTS: u64 = 10_000;

const MIB: u64 = 1024 * 1024;

/// How a single file is split and sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSettings {
    /// Files at or above this size use multipart upload.
    pub multipart_threshold: u64,
    pub part_size: u64,
    /// Maximum parts in flight for one file.
    pub concurrency: usize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            multipart_threshold: DEFAULT_MULTIPART_THRESHOLD,
            part_size: DEFAULT_PART_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl TransferSettings {
    /// Whether a file of `size` bytes is sent as multiple parts.
    ///
    /// Empty files always use a single request: a multipart upload needs at
    /// least one part.
    pub fn is_multipart(&self, size: u64) -> bool {
        size > 0 && size >= self.multipart_threshold
    }

    /// Part size used for a file of `size` bytes.
    ///
    /// The configured size, grown to a whole number of MiB when the file would
    /// otherwise need more than [`MAX_PARTS`] parts.
    pub fn part_size_for(&self, size: u64) -> u64 {
        let part_size = self.part_size.max(1);
        if size.div_ceil(part_size) <= MAX_PARTS {
            return part_size;
        }
        let needed = size.div_ceil(MAX_PARTS).div_ceil(MIB) * MIB;
        needed.max(part_size)
    }
}

pub struct TransferEngine {
    backend: Arc<dyn ObjectBackend>,
    settings: TransferSettings,
    progress: Arc<dyn ProgressObserver>,
}

impl TransferEngine {
    pub fn new(backend: Arc<dyn ObjectBackend>, settings: TransferSettings) -> Self {
        Self {
            backend,
            settings,
            progress: Arc::new(NoProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressObserver>) -> Self {
        self.progress = progress;
        self
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    /// Upload the file at `path` to `key` with `options` attached.
    ///
    /// # Errors
    /// `SyncError::Io` if the file cannot be read, `SyncError::Transport` if
    /// the backend rejects any request.
    pub async fn upload(&self, path: &Path, key: &str, options: &UploadOptions) -> Result<()> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| SyncError::io(path, e))?
            .len();

        if self.settings.is_multipart(size) {
            self.upload_multipart(path, key, size, options).await
        } else {
            self.upload_single(path, key, size, options).await
        }
    }

    async fn upload_single(
        &self,
        path: &Path,
        key: &str,
        size: u64,
        options: &UploadOptions,
    ) -> Result<()> {
        let data = tokio::fs::read(path)
            .await
            .map_err(|e| SyncError::io(path, e))?;
        let sent = data.len() as u64;

        self.backend
            .put_object(key, Bytes::from(data), options)
            .await?;
        self.progress.on_bytes(key, sent, size.max(sent));
        Ok(())
    }

    async fn upload_multipart(
        &self,
        path: &Path,
        key: &str,
        size: u64,
        options: &UploadOptions,
    ) -> Result<()> {
        let mut session = self.backend.start_multipart(key, options).await?;

        match self.send_parts(session.as_mut(), path, key, size).await {
            Ok(parts) => {
                session.complete().await?;
                debug!("Completed {} in {} parts", key, parts);
                Ok(())
            }
            Err(e) => {
                if let Err(abort_err) = session.abort().await {
                    warn!("Failed to abort multipart upload for {}: {}", key, abort_err);
                }
                Err(e)
            }
        }
    }

    /// Read and dispatch parts, keeping at most `concurrency` in flight.
    ///
    /// On the first failure the remaining in-flight parts are dropped.
    async fn send_parts(
        &self,
        session: &mut dyn MultipartSession,
        path: &Path,
        key: &str,
        size: u64,
    ) -> Result<usize> {
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| SyncError::io(path, e))?;
        let part_size = self.settings.part_size_for(size);
        if part_size != self.settings.part_size {
            debug!(
                "Part size for {} raised to {} to stay within {} parts",
                key,
                format_bytes(part_size),
                MAX_PARTS
            );
        }
        let part_size = part_size as usize;
        let concurrency = self.settings.concurrency.max(1);

        let mut in_flight = FuturesUnordered::new();
        let mut transferred = 0u64;
        let mut parts = 0usize;

        loop {
            let chunk = read_part(&mut file, part_size)
                .await
                .map_err(|e| SyncError::io(path, e))?;
            if chunk.is_empty() {
                break;
            }

            let len = chunk.len() as u64;
            in_flight.push(session.put_part(chunk).map(move |r| r.map(|_| len)));
            parts += 1;

            while in_flight.len() >= concurrency {
                if let Some(result) = in_flight.next().await {
                    transferred += result?;
                    self.progress.on_bytes(key, transferred, size);
                }
            }
        }

        while let Some(result) = in_flight.next().await {
            transferred += result?;
            self.progress.on_bytes(key, transferred, size);
        }

        Ok(parts)
    }
}

/// Fill up to `part_size` bytes; a short read only happens at end of file.
async fn read_part(file: &mut tokio::fs::File, part_size: usize) -> std::io::Result<Bytes> {
    let mut buf = BytesMut::with_capacity(part_size);
    while buf.len() < part_size {
        let mut limited = (&mut *file).take((part_size - buf.len()) as u64);
        let n = limited.read_buf(&mut buf).await?;
        if n == 0 {
            break;
        }
    }
    Ok(buf.freeze())
}
