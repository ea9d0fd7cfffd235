//! Startup housekeeping for the logs directory.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use log::{debug, info, warn};
use crate::error::{PipelineError, Result};

/// Application log, kept across cleanups and truncated on every start
pub const APP_LOG_NAME: &str = "app.log";

/// Encoder logs older than this are removed at startup
pub const MAX_LOG_AGE: Duration = Duration::from_secs(24 * 60 * 60);

/// Create the logs directory; failure is fatal
pub fn prepare_logs_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| {
        PipelineError::StartupFatal(format!("failed to create logs directory {}: {}", dir.display(), e))
    })
}

/// Delete files in `dir` whose modification time is older than `max_age`.
///
/// `app.log` is never removed. Individual failures are logged and skipped.
/// Returns the paths that were deleted.
pub fn cleanup_old_logs(dir: &Path, max_age: Duration) -> Vec<PathBuf> {
    let mut removed = Vec::new();

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Error reading logs directory {}: {}", dir.display(), e);
            return removed;
        }
    };

    let now = SystemTime::now();
    for entry in entries.filter_map(|e| e.ok()) {
        if entry.file_name() == APP_LOG_NAME {
            continue;
        }

        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                debug!("Cannot stat {}: {}", path.display(), e);
                continue;
            }
        };

        // Files stamped in the future have no age
        let age = now.duration_since(modified).unwrap_or_default();
        if age <= max_age {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                info!("Removed old log file: {}", path.display());
                removed.push(path);
            }
            Err(e) => warn!("Error removing old log file {}: {}", path.display(), e),
        }
    }

    removed
}

/// Open `<dir>/app.log`, truncated
pub fn open_app_log(dir: &Path) -> Result<File> {
    let path = dir.join(APP_LOG_NAME);
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
        .map_err(|e| PipelineError::StartupFatal(format!("failed to open {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_prepare_creates_nested_dir() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("a").join("logs");
        prepare_logs_dir(&logs).unwrap();
        assert!(logs.is_dir());
    }

    #[test]
    fn test_prepare_fails_under_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        fs::write(&file, b"x").unwrap();
        let err = prepare_logs_dir(&file.join("logs")).unwrap_err();
        assert!(matches!(err, PipelineError::StartupFatal(_)));
    }

    #[test]
    fn test_cleanup_keeps_app_log_and_fresh_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(APP_LOG_NAME), b"old app log").unwrap();
        fs::write(dir.path().join("A_ffmpeg.log"), b"frame=1").unwrap();

        // Everything counts as old with a zero max age, except app.log
        std::thread::sleep(Duration::from_millis(20));
        let removed = cleanup_old_logs(dir.path(), Duration::ZERO);
        assert_eq!(removed, vec![dir.path().join("A_ffmpeg.log")]);
        assert!(dir.path().join(APP_LOG_NAME).exists());

        fs::write(dir.path().join("B_ffmpeg.log"), b"frame=1").unwrap();
        assert!(cleanup_old_logs(dir.path(), MAX_LOG_AGE).is_empty());
        assert!(dir.path().join("B_ffmpeg.log").exists());
    }

    #[test]
    fn test_cleanup_missing_dir_is_not_an_error() {
        assert!(cleanup_old_logs(Path::new("/nonexistent/av1q/logs"), MAX_LOG_AGE).is_empty());
    }

    #[test]
    fn test_app_log_is_truncated() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(APP_LOG_NAME), b"previous run").unwrap();

        let mut log = open_app_log(dir.path()).unwrap();
        writeln!(log, "fresh").unwrap();
        drop(log);

        assert_eq!(fs::read_to_string(dir.path().join(APP_LOG_NAME)).unwrap(), "fresh\n");
    }
}
