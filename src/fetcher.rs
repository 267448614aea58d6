//! Per-instance rendered image retrieval with bounded retry

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::remote::ImageSource;
use crate::retry::retry_fixed;
use crate::types::{FetchedImage, InstanceRef, StudyUid};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Fetches one JPEG per instance into a study's working directory
#[derive(Clone)]
pub struct InstanceFetcher {
    source: Arc<dyn ImageSource>,
    retry: RetryConfig,
    temp_dir: PathBuf,
}

impl InstanceFetcher {
    /// Create a fetcher writing below `temp_dir`
    pub fn new(source: Arc<dyn ImageSource>, retry: RetryConfig, temp_dir: PathBuf) -> Self {
        Self {
            source,
            retry,
            temp_dir,
        }
    }

    /// Working directory of one study
    pub fn study_dir(&self, study_uid: &StudyUid) -> PathBuf {
        self.temp_dir.join(study_uid.as_str())
    }

    /// Local location of one instance's JPEG
    pub fn image_path(&self, study_uid: &StudyUid, instance: &InstanceRef) -> Result<PathBuf> {
        Ok(self
            .study_dir(study_uid)
            .join(path_component(&instance.series_uid)?)
            .join(format!("{}.jpeg", path_component(&instance.sop_uid)?)))
    }

    /// Fetch the rendered JPEG of one instance
    ///
    /// Any file left from an earlier attempt is replaced. When every attempt
    /// fails the result is [`Error::FetchExhausted`] carrying the last
    /// failure.
    pub async fn fetch_image(&self, study_uid: &StudyUid, instance: &InstanceRef) -> Result<FetchedImage> {
        let path = self.image_path(study_uid, instance)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        remove_stale(&path).await;

        let label = format!("fetch {}", instance.sop_uid);
        let body = retry_fixed(&self.retry, &label, |attempt| {
            let source = self.source.clone();
            async move {
                let result = source
                    .fetch_rendered(study_uid.as_str(), &instance.series_uid, &instance.sop_uid)
                    .await;
                if let Err(e) = &result {
                    warn!(sop_uid = %instance.sop_uid, attempt, error = %e, "JPEG fetch attempt failed");
                }
                result
            }
        })
        .await
        .map_err(|exhausted| Error::FetchExhausted {
            sop_uid: instance.sop_uid.clone(),
            attempts: exhausted.attempts,
            reason: exhausted.last_error.to_string(),
        })?;

        tokio::fs::write(&path, &body).await?;
        info!(sop_uid = %instance.sop_uid, bytes = body.len(), "fetched JPEG");

        Ok(FetchedImage {
            instance: instance.clone(),
            path,
            bytes: body.len() as u64,
        })
    }
}

async fn remove_stale(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => info!(?path, "overwriting existing JPEG"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(?path, error = %e, "could not delete existing JPEG"),
    }
}

fn path_component(uid: &str) -> Result<&str> {
    if uid.is_empty() || uid.contains(['/', '\\']) || uid == "." || uid == ".." {
        return Err(Error::InvalidInput(format!("UID is not a valid file name: {uid:?}")));
    }
    Ok(uid)
}
