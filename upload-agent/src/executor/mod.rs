//! Upload run executor - drives one source directory into one bucket/prefix.
//!
//! Files are processed strictly one after another in collection order:
//! fingerprint, probe (with skip-existing), decide, upload, verify, record.
//! Parallelism only exists inside the transfer of a single large file.

pub mod accountant;
pub mod manifest;

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::fs::filter::PathFilter;
use crate::fs::walker::{FileCollector, FileEntry};
use crate::report::Reporter;
use crate::storage::{probe, ObjectBackend, UploadOptions};
use crate::sync::checksum::{fingerprint, Fingerprint};
use crate::sync::decision::{decide, Decision};
use crate::sync::verify::verify;
use crate::transfer::engine::{TransferEngine, TransferSettings};
use crate::transfer::progress::{NoProgress, ProgressObserver};
use crate::utils::errors::{Result, SyncError};
use accountant::{FileOutcome, RunAccountant, RunResult};
use manifest::ManifestWriter;

/// Everything one run needs to know.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub source: PathBuf,
    /// Prepended verbatim to each relative path to form the key.
    pub prefix: String,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub max_size_bytes: Option<u64>,
    pub transfer: TransferSettings,
    pub storage_class: Option<String>,
    pub skip_existing: bool,
    pub verify: bool,
    pub dry_run: bool,
    pub fail_fast: bool,
    pub manifest: Option<PathBuf>,
}

impl RunOptions {
    /// Options with every switch off and default transfer settings.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            prefix: String::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            max_size_bytes: None,
            transfer: TransferSettings::default(),
            storage_class: None,
            skip_existing: false,
            verify: false,
            dry_run: false,
            fail_fast: false,
            manifest: None,
        }
    }

    /// # Errors
    /// `SyncError::Config` for a missing source directory or zero concurrency/part size.
    pub fn validate(&self) -> Result<()> {
        if !self.source.is_dir() {
            return Err(SyncError::Config(format!(
                "Source directory not found: {}",
                self.source.display()
            )));
        }
        if self.transfer.concurrency == 0 {
            return Err(SyncError::Config("concurrency must be at least 1".into()));
        }
        if self.transfer.part_size == 0 {
            return Err(SyncError::Config("part size must be positive".into()));
        }
        Ok(())
    }
}

/// Destination key for a relative path: plain concatenation.
pub fn destination_key(prefix: &str, relative_path: &str) -> String {
    format!("{}{}", prefix, relative_path)
}

/// A file being processed: its facts, fingerprint and destination key.
#[derive(Debug)]
pub struct UploadTask<'a> {
    pub entry: &'a FileEntry,
    pub fingerprint: Fingerprint,
    pub key: String,
}

/// Main upload executor
pub struct SyncExecutor {
    backend: Arc<dyn ObjectBackend>,
    reporter: Arc<dyn Reporter>,
    progress: Arc<dyn ProgressObserver>,
    cancel_token: CancellationToken,
}

impl SyncExecutor {
    /// Create a new executor (no cancellation support)
    pub fn new(backend: Arc<dyn ObjectBackend>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            backend,
            reporter,
            progress: Arc::new(NoProgress),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Stop issuing new per-file work once `cancel_token` is cancelled.
    pub fn with_cancel(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressObserver>) -> Self {
        self.progress = progress;
        self
    }

    /// Execute a run.
    ///
    /// Per-file failures are counted in the returned [`RunResult`]. Only
    /// configuration problems found before the first file (bad source, bad
    /// glob, unopenable manifest) are returned as `Err`.
    pub async fn execute(&self, options: &RunOptions) -> Result<RunResult> {
        options.validate()?;
        let filter = PathFilter::new(&options.include, &options.exclude)?;
        let mut manifest = ManifestWriter::open(options.manifest.as_deref())?;
        let engine = TransferEngine::new(Arc::clone(&self.backend), options.transfer)
            .with_progress(Arc::clone(&self.progress));
        let mut accountant = RunAccountant::new();

        info!(
            "Uploading {} to s3://{}/{}{}",
            options.source.display(),
            self.backend.bucket(),
            options.prefix,
            if options.dry_run { " (dry run)" } else { "" }
        );

        let mut collector = Some(FileCollector::new(
            &options.source,
            filter,
            options.max_size_bytes,
            Arc::clone(&self.reporter),
        ));

        while let Some(entry) = next_entry(&mut collector).await {
            if self.cancel_token.is_cancelled() {
                warn!("Interrupted, not starting {}", entry.relative_path);
                accountant.interrupted();
                break;
            }

            accountant.scanned();
            let key = destination_key(&options.prefix, &entry.relative_path);

            let outcome = match self.process(&engine, &entry, &key, options).await {
                Ok((fingerprint, outcome)) => match manifest.append(&fingerprint, &key) {
                    Ok(()) => outcome,
                    Err(e) => FileOutcome::Errored(e),
                },
                Err(e) => FileOutcome::Errored(e),
            };

            let stop = match &outcome {
                FileOutcome::Errored(e) => {
                    self.reporter.errored(&key, e);
                    options.fail_fast || e.is_fatal()
                }
                _ => false,
            };
            accountant.record(&key, outcome);

            if stop {
                warn!("Stopping after error on {}", key);
                break;
            }
        }

        let manifest_name = manifest
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        if manifest.is_enabled() {
            info!(
                "Manifest {}: {} line(s) appended",
                manifest_name,
                manifest.written()
            );
        }
        if let Err(e) = manifest.finish() {
            self.reporter.errored(&manifest_name, &e);
            accountant.record(&manifest_name, FileOutcome::Errored(e));
        }

        let result = accountant.finalize();
        self.reporter.summary(&result);
        Ok(result)
    }

    /// Take one file to a terminal outcome. The fingerprint is returned for the manifest.
    async fn process(
        &self,
        engine: &TransferEngine,
        entry: &FileEntry,
        key: &str,
        options: &RunOptions,
    ) -> Result<(Fingerprint, FileOutcome)> {
        let path = entry.path.clone();
        let fingerprint = tokio::task::spawn_blocking(move || fingerprint(&path))
            .await
            .map_err(|e| SyncError::io(&entry.path, std::io::Error::other(e)))??;

        let task = UploadTask {
            entry,
            fingerprint,
            key: key.to_string(),
        };
        let outcome = self.handle(engine, &task, options).await?;
        Ok((task.fingerprint, outcome))
    }

    async fn handle(
        &self,
        engine: &TransferEngine,
        task: &UploadTask<'_>,
        options: &RunOptions,
    ) -> Result<FileOutcome> {
        let entry = task.entry;
        let remote = if options.skip_existing {
            Some(probe(self.backend.as_ref(), &task.key).await?)
        } else {
            None
        };

        match decide(entry, &task.fingerprint, remote.as_ref(), options.skip_existing) {
            Decision::Skip => {
                self.reporter
                    .skipped(&task.key, entry.size, task.fingerprint.as_str());
                Ok(FileOutcome::Skipped)
            }
            Decision::Upload => {
                self.reporter.uploading(
                    &task.key,
                    entry.size,
                    task.fingerprint.as_str(),
                    options.dry_run,
                );
                if options.dry_run {
                    return Ok(FileOutcome::WouldUpload);
                }

                let upload_options = UploadOptions::for_file(
                    &task.fingerprint,
                    entry.mtime,
                    entry.size,
                    options.storage_class.clone(),
                );
                engine.upload(&entry.path, &task.key, &upload_options).await?;

                if options.verify {
                    verify(
                        self.backend.as_ref(),
                        &task.key,
                        entry.size,
                        &task.fingerprint,
                    )
                    .await?;
                }

                Ok(FileOutcome::Uploaded { bytes: entry.size })
            }
        }
    }
}

/// Pull the next entry off the walker on the blocking pool.
async fn next_entry(collector: &mut Option<FileCollector>) -> Option<FileEntry> {
    let mut walker = collector.take()?;
    let joined = tokio::task::spawn_blocking(move || {
        let entry = walker.next();
        (walker, entry)
    })
    .await;

    match joined {
        Ok((walker, entry)) => {
            if entry.is_some() {
                *collector = Some(walker);
            }
            entry
        }
        Err(e) => {
            warn!("Directory walk aborted: {}", e);
            None
        }
    }
}
