//! Per-file outcome reporting.
//!
//! Components never touch global logging configuration directly; they report
//! through a [`Reporter`] handed to them. [`LogReporter`] forwards to
//! `tracing`, [`CaptureReporter`] keeps the lines in memory.

use std::path::Path;
use std::sync::Mutex;

use tracing::Level;

use crate::executor::accountant::RunResult;
use crate::transfer::progress::{format_bytes, format_duration};
use crate::utils::errors::SyncError;

/// Length of the fingerprint prefix shown in outcome lines.
const SHORT_FINGERPRINT: usize = 10;

/// Sink for human-readable run output.
///
/// Implementors only provide [`Reporter::emit`]; the provided methods fix the
/// line formats.
pub trait Reporter: Send + Sync {
    fn emit(&self, level: Level, line: String);

    fn skipped(&self, key: &str, size: u64, fingerprint: &str) {
        self.emit(
            Level::INFO,
            format!("SKIP {} {} {}", size, key, short(fingerprint)),
        );
    }

    fn uploading(&self, key: &str, size: u64, fingerprint: &str, dry_run: bool) {
        let tag = if dry_run { "DRY-RUN UPLOAD" } else { "UPLOAD" };
        self.emit(
            Level::INFO,
            format!("{} {} {} {}", tag, size, key, short(fingerprint)),
        );
    }

    fn errored(&self, key: &str, error: &SyncError) {
        self.emit(Level::ERROR, format!("ERROR {}: {}", key, error));
    }

    fn oversized(&self, rel_path: &str, size: u64, max: u64) {
        self.emit(Level::WARN, format!("SKIP (size>max) {}", rel_path));
        self.emit(
            Level::DEBUG,
            format!("{} is {} bytes, limit {} bytes", rel_path, size, max),
        );
    }

    fn ignored(&self, path: &Path, reason: &str) {
        self.emit(Level::WARN, format!("IGNORE {}: {}", path.display(), reason));
    }

    fn summary(&self, result: &RunResult) {
        self.emit(Level::INFO, format!("Scanned: {}", result.scanned));
        self.emit(Level::INFO, format!("Uploaded: {}", result.uploaded));
        self.emit(Level::INFO, format!("Skipped: {}", result.skipped));
        self.emit(Level::INFO, format!("Errors: {}", result.errored));
        self.emit(
            Level::INFO,
            format!(
                "Bytes uploaded: {:.2} MB",
                result.bytes_transferred as f64 / (1024.0 * 1024.0)
            ),
        );
        self.emit(
            Level::DEBUG,
            format!(
                "Run took {} ({} transferred)",
                format_duration(result.duration_secs()),
                format_bytes(result.bytes_transferred)
            ),
        );
    }
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..SHORT_FINGERPRINT).unwrap_or(fingerprint)
}

/// Reporter that writes through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn emit(&self, level: Level, line: String) {
        match level {
            Level::ERROR => tracing::error!("{}", line),
            Level::WARN => tracing::warn!("{}", line),
            Level::INFO => tracing::info!("{}", line),
            Level::DEBUG => tracing::debug!("{}", line),
            Level::TRACE => tracing::trace!("{}", line),
        }
    }
}

/// Reporter that records lines at INFO and above, in order.
#[derive(Debug, Default)]
pub struct CaptureReporter {
    lines: Mutex<Vec<String>>,
}

impl CaptureReporter {
    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }
}

impl Reporter for CaptureReporter {
    fn emit(&self, level: Level, line: String) {
        if level > Level::INFO {
            return;
        }
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA: &str = "3f2a9c01de5b7788aa99bbccddeeff00112233445566778899aabbccddeeff00";

    #[test]
    fn test_outcome_line_formats() {
        let reporter = CaptureReporter::default();
        reporter.skipped("raw/a.csv", 12, SHA);
        reporter.uploading("raw/b.csv", 7, SHA, false);
        reporter.uploading("raw/c.csv", 3, SHA, true);
        reporter.errored("raw/d.csv", &SyncError::transport("raw/d.csv", "timeout"));

        assert_eq!(
            reporter.lines(),
            vec![
                "SKIP 12 raw/a.csv 3f2a9c01de",
                "UPLOAD 7 raw/b.csv 3f2a9c01de",
                "DRY-RUN UPLOAD 3 raw/c.csv 3f2a9c01de",
                "ERROR raw/d.csv: Transport error for raw/d.csv: timeout",
            ]
        );
    }

    #[test]
    fn test_capture_drops_debug_lines() {
        let reporter = CaptureReporter::default();
        reporter.oversized("big.bin", 11, 10);
        assert_eq!(reporter.lines(), vec!["SKIP (size>max) big.bin"]);
    }

    #[test]
    fn test_short_fingerprint_handles_short_input() {
        assert_eq!(short("abc"), "abc");
        assert_eq!(short(SHA), "3f2a9c01de");
    }
}
