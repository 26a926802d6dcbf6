//! Rotating file sink for the proxy's stdout and stderr.
//!
//! Both streams of every proxy instance are written into the same file.
//! The file is rotated as soon as a write would push it past the configured
//! size; rotated copies are optionally compressed and pruned by count and
//! age.
//!
//! ## Module Structure
//!
//! - [`types`]: Rotation configuration
//! - [`rotation`]: Renaming, compression and cleanup of rotated files

mod rotation;
mod types;

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::proxy::{Error, Result};

pub use types::{
    DEFAULT_MAX_AGE_DAYS, DEFAULT_MAX_BACKUPS, DEFAULT_MAX_SIZE_MB, LogRotationConfig,
};

/// Shared handle to the proxy log file.
///
/// Clones write to the same file; writes from concurrent tasks are
/// serialized.
#[derive(Clone)]
pub struct LogSink {
    inner: Arc<Mutex<RotatingFile>>,
}

struct RotatingFile {
    path: PathBuf,
    config: LogRotationConfig,
    file: File,
    size: u64,
    /// Held by compression and cleanup jobs so they never overlap.
    retention: Arc<Mutex<()>>,
}

impl LogSink {
    /// Open (or create) the log file at `path` in append mode.
    pub fn open(path: impl Into<PathBuf>, config: LogRotationConfig) -> Result<Self> {
        let path = path.into();

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| {
                Error::io(format!("creating log directory {}", dir.display()), e)
            })?;
        }

        let file = open_append(&path)?;
        let size = file
            .metadata()
            .map_err(|e| Error::io(format!("reading metadata of {}", path.display()), e))?
            .len();

        Ok(Self {
            inner: Arc::new(Mutex::new(RotatingFile {
                path,
                config,
                file,
                size,
                retention: Arc::new(Mutex::new(())),
            })),
        })
    }

    /// Path of the active log file.
    pub fn path(&self) -> PathBuf {
        self.inner.lock().path.clone()
    }

    /// Append `buf`, rotating first if it would exceed the size limit.
    pub fn write(&self, buf: &[u8]) -> Result<()> {
        self.inner.lock().write(buf)
    }

    pub fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let path = inner.path.display().to_string();
        inner
            .file
            .flush()
            .map_err(|e| Error::io(format!("flushing {path}"), e))
    }
}

impl RotatingFile {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        let limit = self.config.max_size_bytes();
        if self.size > 0 && self.size.saturating_add(buf.len() as u64) > limit {
            self.rotate()?;
        }

        self.file
            .write_all(buf)
            .map_err(|e| Error::io(format!("writing {}", self.path.display()), e))?;
        self.size += buf.len() as u64;
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        // Flush errors surface again on the reopened file if they persist.
        let _ = self.file.flush();

        let rotated = rotation::rename_aside(&self.path)
            .map_err(|e| Error::io(format!("rotating {}", self.path.display()), e))?;

        self.file = open_append(&self.path)?;
        self.size = 0;

        let log_path = self.path.clone();
        let config = self.config.clone();
        let retention = Arc::clone(&self.retention);
        let job = move || {
            let _guard = retention.lock();
            rotation::finish_rotation(&log_path, rotated, &config);
        };

        // Compression and cleanup stay off the async workers and out of the
        // sink lock.
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(job);
            },
            Err(_) => job(),
        }
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::io(format!("opening log file {}", path.display()), e))
}
