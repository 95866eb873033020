//! # File Retention
//!
//! Uploaded and processed files are only kept for a fixed window. Eviction is
//! driven purely by file modification time, independent of job state, so a
//! result that was never downloaded still disappears on schedule.
//!
//! ## Key Operations:
//! - **sweep**: Delete every expired file directly inside the managed directories
//! - **time_until_deletion**: Seconds a file has left (0 when missing or expired)
//! - **delete**: Immediate, idempotent removal of one file
//! - **spawn_sweeper**: Background task that sweeps on an interval

use crate::jobs::store::JobStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Result of a manual deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Age-based eviction for a set of directories.
#[derive(Debug, Clone)]
pub struct RetentionManager {
    directories: Vec<PathBuf>,
    retention: Duration,
}

impl RetentionManager {
    pub fn new(directories: Vec<PathBuf>, retention: Duration) -> Self {
        Self { directories, retention }
    }

    /// Delete all files older than the retention window.
    ///
    /// Subdirectories are not descended into. Missing directories and
    /// individual failures are logged and skipped.
    ///
    /// ## Returns:
    /// Number of files deleted.
    pub fn sweep(&self) -> usize {
        let now = SystemTime::now();
        let mut total_deleted = 0;

        for directory in &self.directories {
            let entries = match std::fs::read_dir(directory) {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    error!(directory = %directory.display(), "Error scanning directory: {}", e);
                    continue;
                }
            };

            for entry in entries.flatten() {
                let path = entry.path();
                let metadata = match entry.metadata() {
                    Ok(metadata) if metadata.is_file() => metadata,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(path = %path.display(), "Failed to stat file: {}", e);
                        continue;
                    }
                };

                let Ok(modified) = metadata.modified() else {
                    continue;
                };

                if age_at(now, modified) > self.retention {
                    match std::fs::remove_file(&path) {
                        Ok(()) => {
                            total_deleted += 1;
                            info!(path = %path.display(), "Deleted expired file");
                        }
                        Err(e) => error!(path = %path.display(), "Error deleting file: {}", e),
                    }
                }
            }
        }

        if total_deleted > 0 {
            info!("Cleanup completed: {} files deleted", total_deleted);
        }

        total_deleted
    }

    /// Age of a file (`None` when it does not exist).
    pub fn file_age(&self, path: &Path) -> Option<Duration> {
        let modified = std::fs::metadata(path).ok()?.modified().ok()?;
        Some(age_at(SystemTime::now(), modified))
    }

    /// Whole seconds until the sweep would delete `path`.
    pub fn time_until_deletion(&self, path: &Path) -> u64 {
        match self.file_age(path) {
            Some(age) => self.retention.saturating_sub(age).as_secs(),
            None => 0,
        }
    }

    /// Remove a file now. Missing files are not an error.
    pub fn delete(&self, path: &Path) -> DeleteOutcome {
        if !path.is_file() {
            return DeleteOutcome::NotFound;
        }

        match std::fs::remove_file(path) {
            Ok(()) => {
                info!(path = %path.display(), "Deleted file");
                DeleteOutcome::Deleted
            }
            Err(e) => {
                error!(path = %path.display(), "Error deleting file: {}", e);
                DeleteOutcome::NotFound
            }
        }
    }
}

/// Future modification times count as age zero.
fn age_at(now: SystemTime, modified: SystemTime) -> Duration {
    now.duration_since(modified).unwrap_or(Duration::ZERO)
}

/// Run `sweep` every `interval` on the blocking pool, and drop expired job
/// metadata alongside.
pub fn spawn_sweeper(manager: Arc<RetentionManager>, store: Arc<JobStore>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let sweeper = manager.clone();
            match tokio::task::spawn_blocking(move || sweeper.sweep()).await {
                Ok(deleted) => debug!(deleted, "Retention sweep finished"),
                Err(e) => error!("Retention sweep panicked: {}", e),
            }

            let purged = store.purge_expired();
            if purged > 0 {
                debug!(purged, "Purged expired job metadata");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    const WINDOW: Duration = Duration::from_secs(600);

    fn touch(path: &Path, age: Duration) {
        let file = File::create(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn test_sweep_deletes_only_expired_files() {
        let uploads = tempfile::tempdir().unwrap();
        let processed = tempfile::tempdir().unwrap();

        let expired = uploads.path().join("old.mp3");
        let fresh = uploads.path().join("new.mp3");
        let expired_output = processed.path().join("enhanced_old.wav");
        touch(&expired, WINDOW + Duration::from_secs(1));
        touch(&fresh, WINDOW - Duration::from_secs(1));
        touch(&expired_output, WINDOW + Duration::from_secs(60));

        // Nested directories are left alone
        let nested = uploads.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        touch(&nested.join("deep.wav"), WINDOW * 2);

        let manager = RetentionManager::new(
            vec![uploads.path().to_path_buf(), processed.path().to_path_buf()],
            WINDOW,
        );

        assert_eq!(manager.sweep(), 2);
        assert!(!expired.exists());
        assert!(!expired_output.exists());
        assert!(fresh.exists());
        assert!(nested.join("deep.wav").exists());
    }

    #[test]
    fn test_sweep_skips_missing_directories() {
        let manager = RetentionManager::new(vec![PathBuf::from("/definitely/not/here")], WINDOW);
        assert_eq!(manager.sweep(), 0);
    }

    #[test]
    fn test_time_until_deletion() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RetentionManager::new(vec![dir.path().to_path_buf()], WINDOW);

        let fresh = dir.path().join("fresh.wav");
        File::create(&fresh).unwrap();
        let remaining = manager.time_until_deletion(&fresh);
        assert!(remaining <= 600 && remaining >= 598);

        let expired = dir.path().join("expired.wav");
        touch(&expired, WINDOW * 2);
        assert_eq!(manager.time_until_deletion(&expired), 0);

        assert_eq!(manager.time_until_deletion(&dir.path().join("missing.wav")), 0);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RetentionManager::new(vec![dir.path().to_path_buf()], WINDOW);
        let path = dir.path().join("file.wav");
        File::create(&path).unwrap();

        assert_eq!(manager.delete(&path), DeleteOutcome::Deleted);
        assert_eq!(manager.delete(&path), DeleteOutcome::NotFound);
        assert!(!path.exists());
    }
}
