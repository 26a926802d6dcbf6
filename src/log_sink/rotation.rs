//! Rotation of the proxy log file.
//!
//! Rotated logs are renamed with a timestamp suffix
//! (e.g. `proxy.log.20250101-120000.123`), optionally gzipped to
//! `proxy.log.20250101-120000.123.gz`, and pruned by count and age.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::Utc;
use flate2::Compression;
use flate2::write::GzEncoder;

use super::types::LogRotationConfig;

/// Rename `log_path` to a timestamped sibling and return the new path.
///
/// The caller reopens `log_path` afterwards.
pub(crate) fn rename_aside(log_path: &Path) -> io::Result<PathBuf> {
    let timestamp = Utc::now().format("%Y%m%d-%H%M%S%.3f");
    let rotated_name = format!(
        "{}.{}",
        log_path.file_name().unwrap_or_default().to_string_lossy(),
        timestamp
    );
    let rotated_path = log_path.with_file_name(rotated_name);

    fs::rename(log_path, &rotated_path)?;
    Ok(rotated_path)
}

/// Compress `rotated` if configured and apply the retention policy.
///
/// Blocking; may take seconds for large files. Returns the final path of
/// the rotated file.
pub(crate) fn finish_rotation(
    log_path: &Path,
    rotated: PathBuf,
    config: &LogRotationConfig,
) -> PathBuf {
    let mut rotated_path = rotated;

    if config.compress {
        match compress(&rotated_path) {
            Ok(compressed) => rotated_path = compressed,
            Err(e) => tracing::warn!(
                path = %rotated_path.display(),
                error = %e,
                "Failed to compress rotated log, keeping it uncompressed"
            ),
        }
    }

    tracing::info!(
        log = %log_path.display(),
        rotated_to = %rotated_path.display(),
        "Rotated proxy log file"
    );

    cleanup_old_logs(log_path, config.max_backups, config.max_age());
    rotated_path
}

/// Gzip `path` into `<path>.gz` and remove the original.
fn compress(path: &Path) -> io::Result<PathBuf> {
    let mut gz_name = path.as_os_str().to_owned();
    gz_name.push(".gz");
    let gz_path = PathBuf::from(gz_name);

    let mut input = BufReader::new(File::open(path)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(&gz_path)?), Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?;

    fs::remove_file(path)?;
    Ok(gz_path)
}

/// Deletes rotated files beyond `max_backups` (newest kept) and those older
/// than `max_age`.
pub(crate) fn cleanup_old_logs(log_path: &Path, max_backups: usize, max_age: Option<Duration>) {
    let log_dir = log_path.parent().unwrap_or_else(|| Path::new("."));
    let log_name = log_path.file_name().unwrap_or_default().to_string_lossy();
    let prefix = format!("{log_name}.");

    let mut rotated_files: Vec<(PathBuf, SystemTime)> = Vec::new();

    if let Ok(entries) = fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            let filename = path.file_name().unwrap_or_default().to_string_lossy();

            if filename.starts_with(&prefix)
                && path != log_path
                && let Ok(metadata) = fs::metadata(&path)
                && let Ok(modified) = metadata.modified()
            {
                rotated_files.push((path, modified));
            }
        }
    }

    // Newest first; names carry the rotation time, so break mtime ties by name.
    rotated_files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| b.0.cmp(&a.0)));

    let now = SystemTime::now();
    for (index, (path, modified)) in rotated_files.iter().enumerate() {
        let over_count = max_backups > 0 && index >= max_backups;
        let too_old = max_age.is_some_and(|age| {
            now.duration_since(*modified)
                .is_ok_and(|elapsed| elapsed > age)
        });

        if !over_count && !too_old {
            continue;
        }

        if let Err(e) = fs::remove_file(path) {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to delete old rotated log"
            );
        } else {
            tracing::debug!(path = %path.display(), "Deleted old rotated log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::{Read, Write};
    use tempfile::TempDir;

    fn rotated_entries(dir: &Path, prefix: &str) -> Vec<PathBuf> {
        fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.file_name().unwrap().to_string_lossy().starts_with(prefix))
            .collect()
    }

    #[test]
    fn test_rotate_uncompressed() {
        let temp_dir = TempDir::new().unwrap();
        let log_file = temp_dir.path().join("proxy.log");
        fs::write(&log_file, "hello\n").unwrap();

        let config = LogRotationConfig::default().compress(false);
        let rotated = rename_aside(&log_file).unwrap();
        let rotated = finish_rotation(&log_file, rotated, &config);

        assert!(!log_file.exists());
        assert_eq!(fs::read_to_string(&rotated).unwrap(), "hello\n");
        assert!(
            rotated
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("proxy.log.")
        );
    }

    #[test]
    fn test_rotate_compressed_keeps_content() {
        let temp_dir = TempDir::new().unwrap();
        let log_file = temp_dir.path().join("proxy.log");
        let mut file = File::create(&log_file).unwrap();
        writeln!(file, "[info] listener added").unwrap();
        drop(file);

        let renamed = rename_aside(&log_file).unwrap();
        assert!(!log_file.exists());
        assert!(renamed.exists());

        let rotated = finish_rotation(&log_file, renamed, &LogRotationConfig::default());
        assert_eq!(rotated.extension().unwrap(), "gz");

        let mut decoded = String::new();
        GzDecoder::new(File::open(&rotated).unwrap())
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "[info] listener added\n");

        // Only the compressed copy remains.
        assert_eq!(rotated_entries(temp_dir.path(), "proxy.log.").len(), 1);
    }

    #[test]
    fn test_cleanup_keeps_max_backups() {
        let temp_dir = TempDir::new().unwrap();
        let log_file = temp_dir.path().join("proxy.log");

        for i in 0..5 {
            let path = temp_dir.path().join(format!("proxy.log.2024010{i}-120000.000"));
            File::create(&path).unwrap();
            std::thread::sleep(Duration::from_millis(10));
        }

        cleanup_old_logs(&log_file, 2, None);

        let mut remaining = rotated_entries(temp_dir.path(), "proxy.log.");
        remaining.sort();
        assert_eq!(remaining.len(), 2);
        assert!(remaining[1].ends_with("proxy.log.20240104-120000.000"));
    }

    #[test]
    fn test_cleanup_zero_backups_keeps_all() {
        let temp_dir = TempDir::new().unwrap();
        let log_file = temp_dir.path().join("proxy.log");
        for i in 0..4 {
            File::create(temp_dir.path().join(format!("proxy.log.{i}"))).unwrap();
        }

        cleanup_old_logs(&log_file, 0, None);
        assert_eq!(rotated_entries(temp_dir.path(), "proxy.log.").len(), 4);
    }

    #[test]
    fn test_cleanup_removes_expired() {
        let temp_dir = TempDir::new().unwrap();
        let log_file = temp_dir.path().join("proxy.log");
        File::create(temp_dir.path().join("proxy.log.old")).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        cleanup_old_logs(&log_file, 0, Some(Duration::from_millis(10)));
        assert!(rotated_entries(temp_dir.path(), "proxy.log.").is_empty());
    }

    #[test]
    fn test_cleanup_ignores_other_files() {
        let temp_dir = TempDir::new().unwrap();
        let log_file = temp_dir.path().join("proxy.log");
        File::create(&log_file).unwrap();
        File::create(temp_dir.path().join("agent.log.1")).unwrap();

        cleanup_old_logs(&log_file, 1, Some(Duration::ZERO));

        assert!(log_file.exists());
        assert!(temp_dir.path().join("agent.log.1").exists());
    }
}
