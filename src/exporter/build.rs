//! The per-study pipeline: list, fetch, annotate, assemble.

use crate::archive;
use crate::error::{Error, Result};
use crate::types::{ExportEvent, FetchedImage, InstanceRef, StudyMetadata, StudyUid};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use tracing::{error, info, warn};

use super::ExportCoordinator;

impl ExportCoordinator {
    /// Body of a background build
    ///
    /// The registry entry is removed however the build ends, including by
    /// panic, so a failed study can be triggered again.
    pub(crate) async fn run_build(&self, study: StudyMetadata) {
        let study_uid = study.study_uid.clone();
        let outcome = AssertUnwindSafe(self.build_archive(&study))
            .catch_unwind()
            .await;

        self.registry.remove(&study_uid).await;

        match outcome {
            Ok(Ok(path)) => {
                info!(study_uid = %study_uid, ?path, "background build finished");
            }
            Ok(Err(e)) => {
                error!(study_uid = %study_uid, error = %e, "background build failed");
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(study_uid = %study_uid, panic = %message, "background build panicked");
                self.emit_event(ExportEvent::BuildFailed {
                    study_uid,
                    error: format!("build panicked: {message}"),
                });
            }
        }
    }

    /// Full pipeline for one study, reporting its outcome as events
    ///
    /// Waits for any other build of the same study to finish first, then
    /// returns without fetching if that build left an archive.
    pub(crate) async fn build_archive(&self, study: &StudyMetadata) -> Result<PathBuf> {
        let result = self.build_archive_inner(study).await;
        if let Err(e) = &result {
            self.emit_event(ExportEvent::BuildFailed {
                study_uid: study.study_uid.clone(),
                error: e.to_string(),
            });
        }
        result
    }

    async fn build_archive_inner(&self, study: &StudyMetadata) -> Result<PathBuf> {
        let study_uid = &study.study_uid;

        // Builds of one study share its working directory and archive path
        let _build = self.registry.build_lock(study_uid).await;
        if let Some(path) = self.pipeline.assembler.existing(study).await {
            let images = archive::entry_count(&path).await.unwrap_or_else(|e| {
                warn!(study_uid = %study_uid, ?path, error = %e, "cannot count archive entries");
                0
            });
            info!(study_uid = %study_uid, ?path, "archive written by an earlier build");
            self.emit_event(ExportEvent::BuildCompleted {
                study_uid: study_uid.clone(),
                path: path.clone(),
                images,
            });
            return Ok(path);
        }

        let instances = self.pipeline.resolver.list_instances(study_uid, true).await?;
        if instances.is_empty() {
            warn!(study_uid = %study_uid, "no renderable instances");
            return Err(Error::EmptyResult {
                study_uid: study_uid.to_string(),
            });
        }

        info!(study_uid = %study_uid, instances = instances.len(), "build started");
        self.emit_event(ExportEvent::BuildStarted {
            study_uid: study_uid.clone(),
            instances: instances.len(),
        });

        let mut images = Vec::with_capacity(instances.len());
        for instance in &instances {
            match self.fetch_and_annotate(study_uid, instance).await {
                Ok(image) => images.push(image),
                Err(e) => {
                    if e.is_per_instance() {
                        warn!(study_uid = %study_uid, sop_uid = %instance.sop_uid, error = %e, "skipping instance");
                    } else {
                        error!(study_uid = %study_uid, sop_uid = %instance.sop_uid, error = %e, "skipping instance");
                    }
                    self.emit_event(ExportEvent::InstanceSkipped {
                        study_uid: study_uid.clone(),
                        sop_uid: instance.sop_uid.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        if images.is_empty() {
            warn!(study_uid = %study_uid, attempted = instances.len(), "every instance failed");
            return Err(Error::EmptyResult {
                study_uid: study_uid.to_string(),
            });
        }

        let path = self.pipeline.assembler.assemble(study, &images).await?;
        info!(
            study_uid = %study_uid,
            ?path,
            images = images.len(),
            skipped = instances.len() - images.len(),
            "archive ready"
        );
        self.emit_event(ExportEvent::BuildCompleted {
            study_uid: study_uid.clone(),
            path: path.clone(),
            images: images.len(),
        });
        Ok(path)
    }

    /// Fetch one instance and burn its metadata into the image
    async fn fetch_and_annotate(&self, study_uid: &StudyUid, instance: &InstanceRef) -> Result<FetchedImage> {
        let image = self.pipeline.fetcher.fetch_image(study_uid, instance).await?;
        let metadata = self.pipeline.resolver.instance_metadata(study_uid, instance).await;

        let annotator = self.pipeline.annotator.clone();
        let path = image.path.clone();
        tokio::task::spawn_blocking(move || annotator.annotate_file(&path, &metadata))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(format!("annotation task failed: {e}"))))??;

        Ok(image)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
