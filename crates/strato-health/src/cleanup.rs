//! Retention cleanup: dated log directories and stale temp files.

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Deletes log directories named `YYYY-MM-DD` once they age past retention.
#[derive(Debug, Clone)]
pub struct LogCleanup {
    base_dir: PathBuf,
    retention_days: i64,
    interval: Duration,
}

impl LogCleanup {
    /// Create a cleaner for `base_dir`.
    #[must_use]
    pub fn new(base_dir: PathBuf, retention_days: i64, interval_hours: u64) -> Self {
        Self {
            base_dir,
            retention_days,
            interval: Duration::from_secs(interval_hours.saturating_mul(3600)),
        }
    }

    /// Directories older than the retention cutoff.
    #[must_use]
    pub fn old_directories(&self) -> Vec<PathBuf> {
        let Ok(entries) = std::fs::read_dir(&self.base_dir) else {
            warn!(dir = %self.base_dir.display(), "log base directory unreadable");
            return Vec::new();
        };
        let cutoff = Utc::now().date_naive() - ChronoDuration::days(self.retention_days);

        let mut old = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            match NaiveDate::parse_from_str(&name, "%Y-%m-%d") {
                Ok(date) if date < cutoff => old.push(path),
                Ok(_) => {},
                Err(_) => {
                    // Non-date directories (temp, backup) are left alone.
                    debug!(dir = %name, "skipping non-date directory");
                },
            }
        }
        old
    }

    /// Run one cleanup pass. Returns `(deleted_count, deleted_bytes)`;
    /// permission errors are logged with a remediation hint and never abort
    /// the pass.
    pub fn cleanup_once(&self) -> (usize, u64) {
        let mut deleted = 0usize;
        let mut freed = 0u64;

        for dir in self.old_directories() {
            let size: u64 = walkdir::WalkDir::new(&dir)
                .into_iter()
                .flatten()
                .filter_map(|e| e.metadata().ok())
                .filter(std::fs::Metadata::is_file)
                .map(|m| m.len())
                .sum();

            match std::fs::remove_dir_all(&dir) {
                Ok(()) => {
                    deleted += 1;
                    freed = freed.saturating_add(size);
                    info!(dir = %dir.display(), mb = size / (1024 * 1024), "deleted old log directory");
                },
                Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                    warn!(
                        dir = %dir.display(),
                        "permission denied deleting logs; run the orchestrator as the log owner \
or fix directory ownership (chown -R)"
                    );
                },
                Err(e) => warn!(dir = %dir.display(), error = %e, "could not delete log directory"),
            }
        }

        (deleted, freed)
    }

    /// Spawn the cleanup loop. The first pass is delayed a minute so startup
    /// stays quick.
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                dir = %self.base_dir.display(),
                retention_days = self.retention_days,
                "log cleanup loop started"
            );
            tokio::time::sleep(Duration::from_secs(60)).await;
            loop {
                let cleaner = self.clone();
                let result = tokio::task::spawn_blocking(move || cleaner.cleanup_once()).await;
                match result {
                    Ok((0, _)) => debug!("log cleanup: nothing to delete"),
                    Ok((count, bytes)) => {
                        info!(count, mb = bytes / (1024 * 1024), "log cleanup pass finished");
                    },
                    Err(e) => warn!(error = %e, "log cleanup task failed"),
                }
                tokio::time::sleep(self.interval).await;
            }
        })
    }
}

/// Deletes stale files from the temp upload and artifact directories.
///
/// Uploads get a short safety TTL (claimed files move on quickly); artifacts
/// live long enough for the user to download them.
#[derive(Debug, Clone)]
pub struct FileJanitor {
    upload_dir: PathBuf,
    artifact_dir: PathBuf,
    upload_ttl: Duration,
    artifact_ttl: Duration,
}

impl FileJanitor {
    /// Create a janitor with the default TTLs (1 h uploads, 12 h artifacts).
    #[must_use]
    pub fn new(upload_dir: PathBuf, artifact_dir: PathBuf) -> Self {
        Self {
            upload_dir,
            artifact_dir,
            upload_ttl: Duration::from_secs(3600),
            artifact_ttl: Duration::from_secs(12 * 3600),
        }
    }

    /// Run one pass over both directories. Returns how many files were
    /// removed.
    pub fn sweep_once(&self) -> usize {
        sweep_dir(&self.upload_dir, self.upload_ttl) + sweep_dir(&self.artifact_dir, self.artifact_ttl)
    }

    /// Spawn the sweep loop (every 15 minutes).
    #[must_use]
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(900)).await;
                let janitor = self.clone();
                match tokio::task::spawn_blocking(move || janitor.sweep_once()).await {
                    Ok(0) => {},
                    Ok(removed) => info!(removed, "stale temp files removed"),
                    Err(e) => warn!(error = %e, "temp sweep failed"),
                }
            }
        })
    }
}

fn sweep_dir(dir: &Path, ttl: Duration) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let stale = metadata
            .modified()
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .is_some_and(|age| age > ttl);
        if stale {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => warn!(file = %path.display(), error = %e, "could not remove stale file"),
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_old_directories_by_date() {
        let base = tempfile::tempdir().unwrap();
        let old_date = (Utc::now().date_naive() - ChronoDuration::days(10)).format("%Y-%m-%d");
        let recent_date = Utc::now().date_naive().format("%Y-%m-%d");
        std::fs::create_dir(base.path().join(old_date.to_string())).unwrap();
        std::fs::create_dir(base.path().join(recent_date.to_string())).unwrap();
        std::fs::create_dir(base.path().join("backup")).unwrap();

        let cleaner = LogCleanup::new(base.path().to_path_buf(), 2, 6);
        let old = cleaner.old_directories();
        assert_eq!(old.len(), 1);
        assert!(old[0].ends_with(old_date.to_string()));
    }

    #[test]
    fn test_cleanup_deletes_recursively() {
        let base = tempfile::tempdir().unwrap();
        let old_date = (Utc::now().date_naive() - ChronoDuration::days(10)).format("%Y-%m-%d");
        let old_dir = base.path().join(old_date.to_string());
        std::fs::create_dir_all(old_dir.join("app")).unwrap();
        std::fs::write(old_dir.join("app").join("app.log"), "log data").unwrap();

        let cleaner = LogCleanup::new(base.path().to_path_buf(), 2, 6);
        let (deleted, freed) = cleaner.cleanup_once();
        assert_eq!(deleted, 1);
        assert!(freed >= 8);
        assert!(!old_dir.exists());
    }

    #[test]
    fn test_missing_base_dir_is_quiet() {
        let cleaner = LogCleanup::new(PathBuf::from("/nonexistent/logs"), 2, 6);
        assert!(cleaner.old_directories().is_empty());
        assert_eq!(cleaner.cleanup_once(), (0, 0));
    }

    #[test]
    fn test_janitor_removes_only_stale() {
        let uploads = tempfile::tempdir().unwrap();
        let artifacts = tempfile::tempdir().unwrap();
        std::fs::write(uploads.path().join("fresh.bin"), "x").unwrap();

        let janitor = FileJanitor::new(
            uploads.path().to_path_buf(),
            artifacts.path().to_path_buf(),
        );
        // Fresh file survives.
        assert_eq!(janitor.sweep_once(), 0);
        assert!(uploads.path().join("fresh.bin").exists());
    }
}
