//! Expiry sweep over the archive cache
//!
//! Archives carry their study date in the file name. Anything older than the
//! retention window, measured from midnight of that date, is deleted. Files
//! that do not look like archives are left alone.

use crate::error::Result;
use chrono::{Local, NaiveDate, NaiveDateTime};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, info, warn};

#[allow(clippy::expect_used)]
static ARCHIVE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{8})_(.+)\.zip$").expect("invalid archive name regex"));

/// Study date encoded in an archive file name, if the name is well formed
pub fn archive_date(file_name: &str) -> Option<NaiveDate> {
    let captures = ARCHIVE_NAME.captures(file_name)?;
    NaiveDate::parse_from_str(captures.get(1)?.as_str(), "%Y%m%d").ok()
}

/// Deletes expired archives from the cache directory
#[derive(Clone, Debug)]
pub struct CacheJanitor {
    cache_dir: PathBuf,
    retention: chrono::Duration,
}

impl CacheJanitor {
    /// Create a janitor for `cache_dir` keeping archives for `retention`
    pub fn new(cache_dir: impl Into<PathBuf>, retention: chrono::Duration) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            retention,
        }
    }

    /// Sweep using the current local time
    pub async fn sweep(&self) -> Result<usize> {
        self.sweep_at(Local::now().naive_local()).await
    }

    /// Sweep as if the current local time were `now`
    ///
    /// Returns the number of archives deleted. A missing cache directory
    /// counts as empty. Failures on single files are logged and skipped.
    pub async fn sweep_at(&self, now: NaiveDateTime) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.cache_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(cache_dir = ?self.cache_dir, "cache directory does not exist, nothing to sweep");
                return Ok(0);
            }
            Err(e) => return Err(e.into()),
        };

        let mut deleted = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("zip") {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                warn!(?path, "skipping archive with non UTF-8 name");
                continue;
            };
            let Some(date) = archive_date(file_name) else {
                warn!(file = file_name, "skipping archive with unrecognized name");
                continue;
            };

            let age = now - date.and_time(chrono::NaiveTime::default());
            if age <= self.retention {
                continue;
            }
            if remove(&path).await {
                deleted += 1;
            }
        }

        info!(cache_dir = ?self.cache_dir, deleted, "cache sweep finished");
        Ok(deleted)
    }
}

async fn remove(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            info!(?path, "deleted expired archive");
            true
        }
        Err(e) => {
            warn!(?path, error = %e, "failed to delete expired archive");
            false
        }
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y%m%d %H:%M:%S").unwrap()
    }

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"zip").unwrap();
        path
    }

    #[test]
    fn parses_date_from_archive_name() {
        assert_eq!(
            archive_date("20240115_1.2.840.9.zip"),
            NaiveDate::from_ymd_opt(2024, 1, 15)
        );
        assert_eq!(archive_date("20240115_.zip"), None, "empty study uid");
        assert_eq!(archive_date("2024011_1.2.zip"), None);
        assert_eq!(archive_date("20241332_1.2.zip"), None, "not a calendar date");
        assert_eq!(archive_date("notes.txt"), None);
    }

    #[tokio::test]
    async fn deletes_only_expired_archives() {
        let temp = tempdir().unwrap();
        let old = touch(temp.path(), "20200101_1.2.3.zip");
        let recent = touch(temp.path(), "20240115_1.2.4.zip");
        let malformed = touch(temp.path(), "latest.zip");
        let unrelated = touch(temp.path(), "20200101_1.2.5.txt");
        let janitor = CacheJanitor::new(temp.path(), chrono::Duration::days(1));

        let deleted = janitor.sweep_at(at("20240115", "18:00:00")).await.unwrap();

        assert_eq!(deleted, 1);
        assert!(!old.exists());
        assert!(recent.exists());
        assert!(malformed.exists());
        assert!(unrelated.exists());
    }

    #[tokio::test]
    async fn retention_is_measured_from_midnight() {
        let temp = tempdir().unwrap();
        let archive = touch(temp.path(), "20240115_1.2.3.zip");
        let janitor = CacheJanitor::new(temp.path(), chrono::Duration::days(1));

        assert_eq!(janitor.sweep_at(at("20240116", "00:00:00")).await.unwrap(), 0);
        assert!(archive.exists(), "exactly one day old is kept");

        assert_eq!(janitor.sweep_at(at("20240116", "00:00:01")).await.unwrap(), 1);
        assert!(!archive.exists());
    }

    #[tokio::test]
    async fn missing_cache_dir_sweeps_nothing() {
        let temp = tempdir().unwrap();
        let janitor = CacheJanitor::new(temp.path().join("absent"), chrono::Duration::days(1));

        assert_eq!(janitor.sweep().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn partial_archives_are_ignored() {
        let temp = tempdir().unwrap();
        let partial = touch(temp.path(), ".20200101_1.2.3.zip.Xk3a9Q.partial");
        let janitor = CacheJanitor::new(temp.path(), chrono::Duration::days(1));

        assert_eq!(janitor.sweep_at(at("20240115", "12:00:00")).await.unwrap(), 0);
        assert!(partial.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_utf8_archive_name_is_skipped_with_warning() {
        use std::os::unix::ffi::OsStrExt;

        let temp = tempdir().unwrap();
        let cache = temp.path().join("cache");
        std::fs::create_dir(&cache).unwrap();
        let odd = cache.join(std::ffi::OsStr::from_bytes(b"2020\xff0101_1.2.zip"));
        std::fs::write(&odd, b"zip").unwrap();

        let log_path = temp.path().join("sweep.log");
        let log = std::fs::File::create(&log_path).unwrap();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || log.try_clone().unwrap())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let janitor = CacheJanitor::new(&cache, chrono::Duration::days(1));
        assert_eq!(janitor.sweep_at(at("20240115", "12:00:00")).await.unwrap(), 0);

        assert!(odd.exists());
        let logged = std::fs::read_to_string(&log_path).unwrap();
        assert!(logged.contains("non UTF-8 name"), "{logged}");
    }
}
