//! Batch builds of every study acquired on a given day
//!
//! Precaching runs [`export_sync`](crate::ExportCoordinator::export_sync) for
//! each study of the date, one after another. A failing study is logged and
//! counted; it never stops the batch, and precaching itself never returns an
//! error.

use crate::error::{Error, Result};
use crate::exporter::ExportCoordinator;
use crate::types::{ExportEvent, StudyUid};
use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Outcome of one precache batch
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecacheReport {
    /// StudyDate that was requested
    pub date: String,
    /// Studies the archive listed for the date
    pub studies_found: usize,
    /// Studies whose archive was built or already cached
    pub built: usize,
    /// Studies that could not be built
    pub failed: usize,
    /// Why the batch did not run, if it did not
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Parse a `YYYYMMDD` StudyDate, requiring a real calendar date
pub fn parse_study_date(date: &str) -> Result<NaiveDate> {
    if date.len() != 8 || !date.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidInput(format!(
            "date must be YYYYMMDD, got {date:?}"
        )));
    }
    NaiveDate::parse_from_str(date, "%Y%m%d")
        .map_err(|e| Error::InvalidInput(format!("{date:?} is not a calendar date: {e}")))
}

/// Builds every study of a date, tolerating individual failures
#[derive(Clone)]
pub struct PrecacheScheduler {
    coordinator: ExportCoordinator,
}

impl PrecacheScheduler {
    /// Create a scheduler building through `coordinator`
    pub fn new(coordinator: ExportCoordinator) -> Self {
        Self { coordinator }
    }

    /// Build the archive of every study with the given StudyDate
    pub async fn precache_by_date(&self, date: &str) -> PrecacheReport {
        let mut report = PrecacheReport {
            date: date.to_string(),
            ..PrecacheReport::default()
        };

        if let Err(e) = parse_study_date(date) {
            error!(date, error = %e, "precache skipped");
            report.error = Some(e.to_string());
            return report;
        }

        info!(date, "precaching studies");
        let studies = match self.coordinator.resolver().studies_on_date(date).await {
            Ok(studies) => studies,
            Err(e) => {
                error!(date, error = %e, "could not list studies for precache");
                report.error = Some(e.to_string());
                return report;
            }
        };
        report.studies_found = studies.len();

        for raw in studies {
            let outcome = match StudyUid::new(&raw) {
                Ok(study_uid) => self.coordinator.export_sync(&study_uid).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(path) => {
                    info!(study_uid = %raw, ?path, "precached study");
                    report.built += 1;
                }
                Err(e) => {
                    warn!(study_uid = %raw, error = %e, "precache failed for study");
                    report.failed += 1;
                }
            }
        }

        info!(
            date,
            studies = report.studies_found,
            built = report.built,
            failed = report.failed,
            "precache finished"
        );
        self.coordinator.emit_event(ExportEvent::PrecacheCompleted {
            date: report.date.clone(),
            built: report.built,
            failed: report.failed,
        });
        report
    }

    /// Precache the studies of the current local date
    pub async fn precache_today(&self) -> PrecacheReport {
        let today = Local::now().format("%Y%m%d").to_string();
        self.precache_by_date(&today).await
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FakeArchive, image_record, test_config};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn scheduler(archive: &FakeArchive, root: &std::path::Path) -> PrecacheScheduler {
        let coordinator = ExportCoordinator::new(
            test_config(root),
            Arc::new(archive.clone()),
            Arc::new(archive.clone()),
        )
        .unwrap();
        PrecacheScheduler::new(coordinator)
    }

    #[test]
    fn study_dates_must_be_calendar_dates() {
        assert_eq!(
            parse_study_date("20240229").unwrap(),
            NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()
        );
        for bad in ["20230229", "2024-01-15", "2024011", "202401150", "abcdefgh", ""] {
            assert!(
                matches!(parse_study_date(bad), Err(Error::InvalidInput(_))),
                "{bad:?} must be rejected"
            );
        }
    }

    #[tokio::test]
    async fn invalid_date_is_reported_not_raised() {
        let temp = tempdir().unwrap();
        let archive = FakeArchive::new();

        let report = scheduler(&archive, temp.path()).precache_by_date("2024-13-01").await;

        assert_eq!(report.studies_found, 0);
        assert!(report.error.unwrap().contains("YYYYMMDD"));
        assert_eq!(archive.instance_queries(), 0);
    }

    #[tokio::test]
    async fn failing_study_does_not_stop_batch() {
        let temp = tempdir().unwrap();
        let archive = FakeArchive::new()
            .with_study("1.1", "20240115", vec![image_record("s", "a")])
            .with_study("1.2", "20240115", vec![])
            .with_study("1.3", "20240115", vec![image_record("s", "c")])
            .with_studies_on_date("20240115", &["1.1", "1.2", "1.3"]);

        let report = scheduler(&archive, temp.path()).precache_by_date("20240115").await;

        assert_eq!(
            report,
            PrecacheReport {
                date: "20240115".into(),
                studies_found: 3,
                built: 2,
                failed: 1,
                error: None,
            }
        );
        assert!(temp.path().join("cache/20240115_1.1.zip").exists());
        assert!(temp.path().join("cache/20240115_1.3.zip").exists());
        assert!(!temp.path().join("cache/20240115_1.2.zip").exists());
    }

    #[tokio::test]
    async fn unreachable_archive_is_reported() {
        let temp = tempdir().unwrap();
        let archive = FakeArchive::new().unreachable();

        let report = scheduler(&archive, temp.path()).precache_by_date("20240115").await;

        assert_eq!(report.built + report.failed, 0);
        assert!(report.error.is_some());
    }
}
