//! Custom test assertions for integration tests

use std::path::{Path, PathBuf};
use std::time::Duration;
use study_export::{ExportEvent, StudyUid};
use tokio::sync::broadcast;

/// Result of waiting for a background build
#[derive(Debug)]
pub enum BuildResult {
    /// Archive written
    Completed { path: PathBuf, images: usize },
    /// Build aborted
    Failed(String),
    /// Timeout waiting for the build
    Timeout,
}

/// Wait for the build of `study_uid` to finish
pub async fn wait_for_build(
    events: &mut broadcast::Receiver<ExportEvent>,
    study_uid: &StudyUid,
    timeout: Duration,
) -> BuildResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(ExportEvent::BuildCompleted {
                    study_uid: uid,
                    path,
                    images,
                }) if &uid == study_uid => return BuildResult::Completed { path, images },
                Ok(ExportEvent::BuildFailed { study_uid: uid, error }) if &uid == study_uid => {
                    return BuildResult::Failed(error);
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return BuildResult::Failed("event channel closed".into());
                }
            }
        }
    })
    .await;

    result.unwrap_or(BuildResult::Timeout)
}

/// Entry names of a zip archive in stored order
pub fn zip_entries(path: &Path) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}
