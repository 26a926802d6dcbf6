//! Rotation settings for the proxy log file.

use std::time::Duration;

use serde::Deserialize;

/// Default maximum log file size before rotation (100 MB).
pub const DEFAULT_MAX_SIZE_MB: u64 = 100;

/// Default number of rotated log files to keep.
pub const DEFAULT_MAX_BACKUPS: usize = 3;

/// Default age after which rotated files are deleted.
pub const DEFAULT_MAX_AGE_DAYS: u32 = 28;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Configuration for log rotation.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogRotationConfig {
    /// Maximum log file size in megabytes before rotation.
    pub max_size_mb: u64,
    /// Maximum number of rotated log files to keep. Zero keeps all.
    pub max_backups: usize,
    /// Rotated files older than this many days are deleted. Zero keeps all.
    pub max_age_days: u32,
    /// Gzip rotated files.
    pub compress: bool,
}

impl Default for LogRotationConfig {
    fn default() -> Self {
        Self {
            max_size_mb: DEFAULT_MAX_SIZE_MB,
            max_backups: DEFAULT_MAX_BACKUPS,
            max_age_days: DEFAULT_MAX_AGE_DAYS,
            compress: true,
        }
    }
}

impl LogRotationConfig {
    /// Create a config with custom size limit in megabytes.
    pub fn with_size_mb(mb: u64) -> Self {
        Self {
            max_size_mb: mb,
            ..Default::default()
        }
    }

    /// Set the maximum number of rotated files to keep.
    #[must_use]
    pub const fn max_backups(mut self, count: usize) -> Self {
        self.max_backups = count;
        self
    }

    #[must_use]
    pub const fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    /// Size threshold in bytes, saturating at `u64::MAX`.
    pub const fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }

    /// Maximum age of rotated files, `None` when unlimited.
    pub fn max_age(&self) -> Option<Duration> {
        (self.max_age_days > 0)
            .then(|| Duration::from_secs(u64::from(self.max_age_days) * SECS_PER_DAY))
    }
}
