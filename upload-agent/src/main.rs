//! Upload Agent - Main entry point
//!
//! Uploads a local directory tree to an S3 bucket, skipping unchanged files.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use upload_agent::{
    config::Config,
    executor::SyncExecutor,
    report::LogReporter,
    shutdown::ShutdownCoordinator,
    storage::s3::S3Backend,
    transfer::LogProgress,
    utils,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Source directory
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Destination bucket
    #[arg(short, long)]
    bucket: Option<String>,

    /// Key prefix, prepended verbatim to each relative path
    #[arg(short, long)]
    prefix: Option<String>,

    /// AWS region
    #[arg(short, long)]
    region: Option<String>,

    /// Profile from the shared AWS credentials/config files
    #[arg(long)]
    profile: Option<String>,

    /// S3-compatible endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Parts in flight per multipart upload
    #[arg(short, long)]
    concurrency: Option<usize>,

    /// List what would be uploaded without uploading
    #[arg(long)]
    dry_run: bool,

    /// Skip files whose remote copy has the same size and fingerprint
    #[arg(long)]
    skip_existing: bool,

    /// Append a SHA-256 manifest line per processed file
    #[arg(long, value_name = "FILE")]
    manifest: Option<PathBuf>,

    /// Re-read object metadata after upload and compare
    #[arg(long)]
    verify: bool,

    /// Exclude glob (repeatable)
    #[arg(long)]
    exclude: Vec<String>,

    /// Include glob (repeatable)
    #[arg(long)]
    include: Vec<String>,

    /// Skip files larger than this
    #[arg(long)]
    max_size_mb: Option<u64>,

    /// Files at or above this size use multipart upload
    #[arg(long)]
    multipart_threshold_mb: Option<u64>,

    /// Multipart part size
    #[arg(long)]
    part_size_mb: Option<u64>,

    /// Log per-file transfer progress
    #[arg(long)]
    progress: bool,

    /// Stop at the first failed file
    #[arg(long)]
    fail_fast: bool,

    /// Storage class for uploaded objects
    #[arg(long)]
    storage_class: Option<String>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,
}

impl Args {
    /// Layer command-line values over the file configuration.
    fn apply(self, config: &mut Config) {
        if let Some(source) = self.source {
            config.source.dir = source;
        }
        if let Some(bucket) = self.bucket {
            config.destination.bucket = bucket;
        }
        if let Some(prefix) = self.prefix {
            config.destination.prefix = prefix;
        }
        if self.region.is_some() {
            config.destination.region = self.region;
        }
        if self.profile.is_some() {
            config.destination.profile = self.profile;
        }
        if self.endpoint.is_some() {
            config.destination.endpoint = self.endpoint;
        }
        if let Some(concurrency) = self.concurrency {
            config.transfer.concurrency = concurrency;
        }
        if self.max_size_mb.is_some() {
            config.source.max_size_mb = self.max_size_mb;
        }
        if let Some(threshold) = self.multipart_threshold_mb {
            config.transfer.multipart_threshold_mb = threshold;
        }
        if let Some(part_size) = self.part_size_mb {
            config.transfer.part_size_mb = part_size;
        }
        if self.storage_class.is_some() {
            config.transfer.storage_class = self.storage_class;
        }
        if self.manifest.is_some() {
            config.run.manifest = self.manifest;
        }
        config.source.include.extend(self.include);
        config.source.exclude.extend(self.exclude);

        config.run.dry_run |= self.dry_run;
        config.run.skip_existing |= self.skip_existing;
        config.run.verify |= self.verify;
        config.run.fail_fast |= self.fail_fast;
        config.run.progress |= self.progress;

        if let Some(level) = self.log_level {
            config.log.level = level;
        } else if self.verbose {
            config.log.level = "debug".to_string();
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(config_path) = &args.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };
    args.apply(&mut config);

    // Initialize logging
    utils::logger::init(&config.log.level)?;

    tracing::info!("Starting upload-agent v{}", env!("CARGO_PKG_VERSION"));

    let options = config.run_options()?;
    let backend = S3Backend::from_config(&config.destination)?;

    // Cancel the run on SIGINT/SIGTERM
    let shutdown_coordinator = ShutdownCoordinator::new();
    let watcher = shutdown_coordinator.clone();
    let signal_handle = tokio::spawn(async move { watcher.wait_for_signal().await });

    let mut executor = SyncExecutor::new(Arc::new(backend), Arc::new(LogReporter))
        .with_cancel(shutdown_coordinator.token());
    if config.run.progress {
        executor = executor.with_progress(Arc::new(LogProgress::default()));
    }

    let result = executor.execute(&options).await;
    signal_handle.abort();
    let result = result?;

    if result.interrupted {
        tracing::warn!("Run interrupted");
    } else if !result.is_success() {
        tracing::error!("{} file(s) failed", result.errored);
    }

    Ok(ExitCode::from(result.exit_code()))
}
