//! Byte-level progress reporting for uploads.
//!
//! Progress is a side channel: observers are told how many bytes of a key have
//! been sent and cannot influence the outcome of the transfer.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Minimum time between two log lines for the same upload.
const LOG_INTERVAL: Duration = Duration::from_millis(250);

/// Receives byte counts while a file is being uploaded.
pub trait ProgressObserver: Send + Sync {
    /// `transferred` is cumulative for `key`; `total` is the file size.
    fn on_bytes(&self, key: &str, transferred: u64, total: u64);
}

/// Observer that ignores all updates.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_bytes(&self, _key: &str, _transferred: u64, _total: u64) {}
}

/// Progress tracker with time-based speed calculation
#[derive(Debug)]
pub struct ProgressTracker {
    start_time: Instant,
    last_update_time: Instant,
    last_bytes: u64,
    bytes_per_second: u64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start_time: now,
            last_update_time: now,
            last_bytes: 0,
            bytes_per_second: 0,
        }
    }

    /// Update with a cumulative byte count and return the instantaneous speed.
    pub fn update(&mut self, transferred_bytes: u64) -> u64 {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_update_time).as_secs_f64();

        if elapsed > 0.0 {
            let bytes_diff = transferred_bytes.saturating_sub(self.last_bytes);
            self.bytes_per_second = (bytes_diff as f64 / elapsed) as u64;
        }

        self.last_update_time = now;
        self.last_bytes = transferred_bytes;
        self.bytes_per_second
    }

    pub fn since_last_update(&self) -> Duration {
        self.last_update_time.elapsed()
    }

    /// Get average speed since start
    pub fn average_speed(&self) -> u64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            (self.last_bytes as f64 / elapsed) as u64
        } else {
            0
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer that logs percentage and speed, throttled per upload.
#[derive(Debug, Default)]
pub struct LogProgress {
    current: Mutex<Option<(String, ProgressTracker)>>,
}

impl ProgressObserver for LogProgress {
    fn on_bytes(&self, key: &str, transferred: u64, total: u64) {
        let Ok(mut current) = self.current.lock() else {
            return;
        };

        let is_new_key = current.as_ref().map(|(k, _)| k != key).unwrap_or(true);
        if is_new_key {
            *current = Some((key.to_string(), ProgressTracker::new()));
        }

        let Some((_, tracker)) = current.as_mut() else {
            return;
        };
        let finished = transferred >= total;
        if !finished && !is_new_key && tracker.since_last_update() < LOG_INTERVAL {
            return;
        }

        let speed = tracker.update(transferred);
        // Final line shows the average over the whole upload.
        let speed = if finished {
            tracker.average_speed()
        } else {
            speed
        };
        tracing::info!(
            "  {} {:.1}% ({} / {}) {}",
            key,
            percent(transferred, total),
            format_bytes(transferred),
            format_bytes(total),
            format_speed(speed)
        );
    }
}

fn percent(transferred: u64, total: u64) -> f64 {
    if total > 0 {
        ((transferred as f64 / total as f64) * 100.0).min(100.0)
    } else {
        100.0
    }
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Format speed as human-readable string
pub fn format_speed(bytes_per_second: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_second))
}

/// Format duration as human-readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_progress_tracker_speed() {
        let mut tracker = ProgressTracker::new();
        tracker.update(100);

        thread::sleep(Duration::from_millis(100));
        let speed = tracker.update(500);
        assert!(speed > 0);
        assert!(tracker.average_speed() > 0);
    }

    #[test]
    fn test_percent() {
        assert!((percent(50, 200) - 25.0).abs() < 0.01);
        assert!((percent(0, 0) - 100.0).abs() < 0.01);
        assert!((percent(300, 200) - 100.0).abs() < 0.01);
    }

    #[test]
    fn test_log_progress_tolerates_any_sequence() {
        let observer = LogProgress::default();
        observer.on_bytes("a", 10, 100);
        observer.on_bytes("a", 100, 100);
        observer.on_bytes("b", 0, 0);
        observer.on_bytes("a", 5, 5);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0.00 B");
        assert_eq!(format_bytes(1023), "1023.00 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1024 * 1024), "1.00 MB");
        assert_eq!(format_bytes(1024 * 1024 * 1024), "1.00 GB");
    }

    #[test]
    fn test_format_speed() {
        assert_eq!(format_speed(1024), "1.00 KB/s");
        assert_eq!(format_speed(1024 * 1024), "1.00 MB/s");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(30), "30s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3665), "1h 1m");
    }
}
