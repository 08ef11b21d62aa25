//! Run-level counters and the overall pass/fail verdict.

use chrono::{DateTime, Utc};

use crate::utils::errors::SyncError;

/// Exit status for a run with per-file errors.
pub const EXIT_FAILED: u8 = 1;
/// Exit status for a run stopped by SIGINT/SIGTERM.
pub const EXIT_INTERRUPTED: u8 = 130;

/// Terminal outcome of one file.
#[derive(Debug)]
pub enum FileOutcome {
    Skipped,
    Uploaded { bytes: u64 },
    /// Dry run: would have been uploaded.
    WouldUpload,
    Errored(SyncError),
}

/// A file that failed, in processing order.
#[derive(Debug)]
pub struct FailedFile {
    pub key: String,
    pub error: SyncError,
}

/// Final tally of a run.
#[derive(Debug)]
pub struct RunResult {
    pub scanned: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub errored: usize,
    /// Sum of sizes of files actually uploaded.
    pub bytes_transferred: u64,
    pub failures: Vec<FailedFile>,
    pub interrupted: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunResult {
    /// A run fails if any file errored or it was interrupted, however much succeeded.
    pub fn is_success(&self) -> bool {
        self.errored == 0 && !self.interrupted
    }

    pub fn exit_code(&self) -> u8 {
        if self.interrupted {
            EXIT_INTERRUPTED
        } else if self.errored > 0 {
            EXIT_FAILED
        } else {
            0
        }
    }

    pub fn duration_secs(&self) -> u64 {
        (self.finished_at - self.started_at).num_seconds().max(0) as u64
    }
}

/// Accumulates outcomes as the driver processes files.
#[derive(Debug)]
pub struct RunAccountant {
    result: RunResult,
}

impl RunAccountant {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            result: RunResult {
                scanned: 0,
                uploaded: 0,
                skipped: 0,
                errored: 0,
                bytes_transferred: 0,
                failures: Vec::new(),
                interrupted: false,
                started_at: now,
                finished_at: now,
            },
        }
    }

    /// Count a collected file.
    pub fn scanned(&mut self) {
        self.result.scanned += 1;
    }

    pub fn record(&mut self, key: &str, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Skipped => self.result.skipped += 1,
            FileOutcome::Uploaded { bytes } => {
                self.result.uploaded += 1;
                self.result.bytes_transferred += bytes;
            }
            FileOutcome::WouldUpload => self.result.uploaded += 1,
            FileOutcome::Errored(error) => {
                self.result.errored += 1;
                self.result.failures.push(FailedFile {
                    key: key.to_string(),
                    error,
                });
            }
        }
    }

    pub fn interrupted(&mut self) {
        self.result.interrupted = true;
    }

    pub fn errored(&self) -> usize {
        self.result.errored
    }

    pub fn finalize(mut self) -> RunResult {
        self.result.finished_at = Utc::now();
        self.result
    }
}

impl Default for RunAccountant {
    fn default() -> Self {
        Self::new()
    }
}
