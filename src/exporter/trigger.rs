//! Cache checks, background build admission and synchronous export.

use crate::error::{Error, Result};
use crate::types::{CheckOutcome, ExportEvent, StudyUid};
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use tracing::{debug, info};

use super::ExportCoordinator;

impl ExportCoordinator {
    /// Serve a cached archive or start a background build for it
    ///
    /// The sequence is:
    /// 1. Resolve the study date; resolution errors are returned as is
    /// 2. If the archive exists, return [`CheckOutcome::Ready`]
    /// 3. If a build for the study is registered, return [`CheckOutcome::AlreadyBuilding`]
    /// 4. While still holding the registry lock, count the study's instances;
    ///    fewer than `expected_instances` means the archive has not received the
    ///    whole study yet and nothing is started
    /// 5. Otherwise register the study and spawn its build
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resolution`] if the study date or instance count cannot
    /// be queried, and [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown)
    /// has been called.
    pub async fn check_or_trigger(&self, study_uid: &StudyUid, expected_instances: usize) -> Result<CheckOutcome> {
        let study = self.pipeline.resolver.resolve_study(study_uid).await?;
        if let Some(path) = self.pipeline.assembler.existing(&study).await {
            debug!(study_uid = %study_uid, ?path, "archive cached");
            return Ok(CheckOutcome::Ready { path });
        }

        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let mut in_flight = self.registry.lock().await;
        if in_flight.contains(study_uid) {
            debug!(study_uid = %study_uid, "build already in progress");
            return Ok(CheckOutcome::AlreadyBuilding);
        }

        let available = self.pipeline.resolver.count_instances(study_uid).await?;
        if available < expected_instances {
            info!(
                study_uid = %study_uid,
                expected = expected_instances,
                available,
                "archive does not hold every instance yet, not building"
            );
            return Ok(CheckOutcome::InsufficientInstances {
                expected: expected_instances,
                available,
            });
        }

        in_flight.insert(study_uid.clone());
        drop(in_flight);

        info!(study_uid = %study_uid, study_date = %study.study_date, "build enqueued");
        self.emit_event(ExportEvent::BuildQueued {
            study_uid: study_uid.clone(),
        });

        let coordinator = self.clone();
        self.builds.spawn(async move {
            coordinator.run_build(study).await;
        });

        Ok(CheckOutcome::Enqueued)
    }

    /// Build the archive for a study in the calling task and return its path
    ///
    /// A cached archive is returned before any instance is listed or fetched.
    /// There is no instance count check. A build of the same study already
    /// running, in the background or in another caller, is waited for and its
    /// archive returned.
    pub async fn export_sync(&self, study_uid: &StudyUid) -> Result<PathBuf> {
        let study = self.pipeline.resolver.resolve_study(study_uid).await?;
        if let Some(path) = self.pipeline.assembler.existing(&study).await {
            debug!(study_uid = %study_uid, ?path, "archive cached");
            return Ok(path);
        }

        self.build_archive(&study).await
    }
}
