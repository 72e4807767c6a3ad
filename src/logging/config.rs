//! Configuration for the write-behind frontend logger

use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_LOG_FILE: &str = "wblog.log";

/// Configuration for the frontend logger's flush cadence and group commit.
///
/// # Presets
///
/// - [`LoggerConfig::default()`] - Balanced (10ms flush cadence)
/// - [`LoggerConfig::synchronous()`] - Flush as soon as any decision arrives
/// - [`LoggerConfig::high_throughput()`] - Larger groups, higher commit latency
#[derive(Debug, Clone)]
pub struct LoggerConfig {
    /// Log file appended by the file sink
    pub log_path: PathBuf,
    /// How often the logger thread runs a flush pass (milliseconds)
    pub flush_interval_ms: u64,
    /// Maximum number of commit/abort decisions handled in one pass
    pub max_batch_size: usize,
    /// Pending decisions that wake the logger before the timer fires
    pub backpressure_threshold: usize,
    /// fsync the log after every group write
    pub sync_on_flush: bool,
    /// Append a COMMIT record after each committed transaction's records
    pub write_commit_markers: bool,
    /// Upper bound on waiting for a commit to become durable (milliseconds)
    pub commit_timeout_ms: u64,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from(DEFAULT_LOG_FILE),
            flush_interval_ms: 10,
            max_batch_size: 1024,
            backpressure_threshold: 256,
            sync_on_flush: true,
            write_commit_markers: false,
            commit_timeout_ms: 30_000,
        }
    }
}

impl LoggerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flush on every decision (lowest commit latency, one fsync per commit)
    pub fn synchronous() -> Self {
        Self {
            flush_interval_ms: 1,
            backpressure_threshold: 1,
            ..Default::default()
        }
    }

    /// Batch many commits per fsync (higher throughput, higher latency)
    pub fn high_throughput() -> Self {
        Self {
            flush_interval_ms: 50,
            max_batch_size: 8192,
            backpressure_threshold: 2048,
            ..Default::default()
        }
    }

    pub fn log_path<P: AsRef<Path>>(mut self, p: P) -> Self {
        self.log_path = p.as_ref().to_path_buf();
        self
    }

    pub fn commit_markers(mut self, enabled: bool) -> Self {
        self.write_commit_markers = enabled;
        self
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms.max(1))
    }

    pub fn commit_timeout(&self) -> Duration {
        Duration::from_millis(self.commit_timeout_ms)
    }
}
