//! Configuration management for the upload agent.
//!
//! Loads configuration from a TOML file; CLI flags are layered on top in `main`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::executor::RunOptions;
use crate::fs::filter::PathFilter;
use crate::transfer::engine::{
    TransferSettings, DEFAULT_CONCURRENCY, DEFAULT_MULTIPART_THRESHOLD, DEFAULT_PART_SIZE,
};
use crate::utils::errors::{Result, SyncError};

const MIB: u64 = 1024 * 1024;

/// Smallest part S3 accepts for any part but the last.
pub const MIN_PART_SIZE_MB: u64 = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    pub transfer: TransferConfig,
    pub run: RunConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Directory to upload
    pub dir: PathBuf,

    /// Glob patterns; a file must match one of them if any are given
    pub include: Vec<String>,

    /// Glob patterns; matching files are never uploaded
    pub exclude: Vec<String>,

    /// Files larger than this are skipped (0 or unset = no limit)
    pub max_size_mb: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    pub bucket: String,

    /// Prepended verbatim to every relative path
    pub prefix: String,

    pub region: Option<String>,

    /// S3-compatible endpoint URL
    pub endpoint: Option<String>,

    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,

    /// Named profile in the shared AWS credentials/config files
    pub profile: Option<String>,

    /// Permit plain-http endpoints
    pub allow_http: bool,

    /// Rely on the instance metadata service when no other credentials are set
    pub allow_instance_credentials: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Parts in flight per multipart upload
    pub concurrency: usize,

    /// Files at or above this size use multipart upload
    pub multipart_threshold_mb: u64,

    pub part_size_mb: u64,

    pub storage_class: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub skip_existing: bool,
    pub verify: bool,
    pub dry_run: bool,
    pub fail_fast: bool,

    /// Append-only SHA-256 manifest
    pub manifest: Option<PathBuf>,

    /// Log per-file transfer progress
    pub progress: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data"),
            include: Vec::new(),
            exclude: Vec::new(),
            max_size_mb: None,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            multipart_threshold_mb: DEFAULT_MULTIPART_THRESHOLD / MIB,
            part_size_mb: DEFAULT_PART_SIZE / MIB,
            storage_class: None,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Check everything that can be checked before touching the network.
    ///
    /// # Errors
    /// `SyncError::Config` or `SyncError::Glob` naming the first problem found.
    pub fn validate(&self) -> Result<()> {
        if !self.source.dir.is_dir() {
            return Err(SyncError::Config(format!(
                "Source directory not found: {}",
                self.source.dir.display()
            )));
        }
        if self.destination.bucket.trim().is_empty() {
            return Err(SyncError::Config("bucket is required".to_string()));
        }
        if self.transfer.concurrency == 0 {
            return Err(SyncError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.transfer.part_size_mb < MIN_PART_SIZE_MB {
            return Err(SyncError::Config(format!(
                "part size must be at least {} MiB, got {}",
                MIN_PART_SIZE_MB, self.transfer.part_size_mb
            )));
        }
        PathFilter::new(&self.source.include, &self.source.exclude)?;
        Ok(())
    }

    /// Validate and convert to executor options.
    pub fn run_options(&self) -> Result<RunOptions> {
        self.validate()?;

        Ok(RunOptions {
            source: self.source.dir.clone(),
            prefix: self.destination.prefix.clone(),
            include: self.source.include.clone(),
            exclude: self.source.exclude.clone(),
            max_size_bytes: self
                .source
                .max_size_mb
                .filter(|mb| *mb > 0)
                .map(|mb| mb * MIB),
            transfer: TransferSettings {
                multipart_threshold: self.transfer.multipart_threshold_mb * MIB,
                part_size: self.transfer.part_size_mb * MIB,
                concurrency: self.transfer.concurrency,
            },
            storage_class: self.transfer.storage_class.clone(),
            skip_existing: self.run.skip_existing,
            verify: self.run.verify,
            dry_run: self.run.dry_run,
            fail_fast: self.run.fail_fast,
            manifest: self.run.manifest.clone(),
        })
    }
}
