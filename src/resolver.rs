//! Study date resolution and instance inventory

use crate::config::InstanceFilterConfig;
use crate::error::{Error, Result};
use crate::remote::{QueryTarget, StudyQuery};
use crate::types::{InstanceMetadata, InstanceRecord, InstanceRef, StudyMetadata, StudyUid};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Read-only view of one study on the remote archive
#[derive(Clone)]
pub struct StudyResolver {
    query: Arc<dyn StudyQuery>,
    target: QueryTarget,
    filter: InstanceFilterConfig,
}

impl StudyResolver {
    /// Create a resolver for the given query endpoint
    pub fn new(query: Arc<dyn StudyQuery>, target: QueryTarget, filter: InstanceFilterConfig) -> Self {
        Self {
            query,
            target,
            filter,
        }
    }

    /// Resolve the StudyDate of a study
    ///
    /// Fails with [`Error::Resolution`] if the query exchange fails or the
    /// archive returns no date.
    pub async fn resolve_study_date(&self, study_uid: &StudyUid) -> Result<String> {
        let date = self
            .query
            .find_study_date(&self.target, study_uid.as_str())
            .await
            .map_err(|e| {
                warn!(study_uid = %study_uid, error = %e, "study date query failed");
                Error::Resolution {
                    study_uid: study_uid.to_string(),
                    reason: e.to_string(),
                }
            })?;

        match date.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()) {
            Some(date) => {
                debug!(study_uid = %study_uid, study_date = %date, "resolved study date");
                Ok(date)
            }
            None => {
                warn!(study_uid = %study_uid, "no StudyDate found");
                Err(Error::Resolution {
                    study_uid: study_uid.to_string(),
                    reason: "StudyDate not found".into(),
                })
            }
        }
    }

    /// Resolve the cache-relevant facts of a study
    pub async fn resolve_study(&self, study_uid: &StudyUid) -> Result<StudyMetadata> {
        let study_date = self.resolve_study_date(study_uid).await?;
        Ok(StudyMetadata {
            study_uid: study_uid.clone(),
            study_date,
        })
    }

    /// List a study's instances in archive order
    ///
    /// With `strict`, instances that cannot be rendered are dropped and each
    /// skip is logged with its reason. Rows without a series or SOP UID are
    /// always dropped since they cannot be fetched. An empty list is not an
    /// error.
    pub async fn list_instances(&self, study_uid: &StudyUid, strict: bool) -> Result<Vec<InstanceRef>> {
        let records = self
            .query
            .find_instances(&self.target, study_uid.as_str())
            .await
            .map_err(|e| Error::Resolution {
                study_uid: study_uid.to_string(),
                reason: e.to_string(),
            })?;

        let instances: Vec<InstanceRef> = records
            .into_iter()
            .filter_map(|record| {
                if strict {
                    if let Some(reason) = self.skip_reason(&record) {
                        warn!(
                            study_uid = %study_uid,
                            sop_uid = record.sop_uid.as_deref().unwrap_or("<missing>"),
                            reason = %reason,
                            "skipping instance"
                        );
                        return None;
                    }
                }
                match (record.series_uid, record.sop_uid) {
                    (Some(series_uid), Some(sop_uid)) => Some(InstanceRef { series_uid, sop_uid }),
                    _ => None,
                }
            })
            .collect();

        info!(study_uid = %study_uid, count = instances.len(), strict, "listed study instances");
        Ok(instances)
    }

    /// Number of instances the archive currently holds for a study
    pub async fn count_instances(&self, study_uid: &StudyUid) -> Result<usize> {
        Ok(self.list_instances(study_uid, false).await?.len())
    }

    /// Descriptive fields of one instance
    ///
    /// A failed or empty query yields blank metadata so annotation can still
    /// proceed.
    pub async fn instance_metadata(&self, study_uid: &StudyUid, instance: &InstanceRef) -> InstanceMetadata {
        match self
            .query
            .find_instance_metadata(
                &self.target,
                study_uid.as_str(),
                &instance.series_uid,
                &instance.sop_uid,
            )
            .await
        {
            Ok(Some(metadata)) => metadata,
            Ok(None) => {
                debug!(sop_uid = %instance.sop_uid, "no descriptive metadata returned");
                InstanceMetadata::default()
            }
            Err(e) => {
                warn!(sop_uid = %instance.sop_uid, error = %e, "metadata query failed");
                InstanceMetadata::default()
            }
        }
    }

    /// Studies carrying the given StudyDate
    pub async fn studies_on_date(&self, date: &str) -> Result<Vec<String>> {
        self.query.find_studies_on_date(&self.target, date).await
    }

    fn skip_reason(&self, record: &InstanceRecord) -> Option<String> {
        if record.sop_uid.as_deref().is_none_or(|s| s.trim().is_empty()) {
            return Some("SOPInstanceUID is missing".into());
        }
        if record.series_uid.as_deref().is_none_or(|s| s.trim().is_empty()) {
            return Some("SeriesInstanceUID is missing".into());
        }
        if let Some(modality) = record.modality.as_deref() {
            if self
                .filter
                .excluded_modalities
                .iter()
                .any(|m| m.eq_ignore_ascii_case(modality.trim()))
            {
                return Some(format!("non-renderable modality {modality}"));
            }
        }
        if let Some(bits) = record.bits_stored {
            if self.filter.excluded_bits_stored.contains(&bits) {
                return Some(format!("{bits}-bit image not supported"));
            }
        }
        match (record.rows, record.columns) {
            (Some(rows), Some(columns)) if rows > 0 && columns > 0 => None,
            (Some(rows), Some(columns)) => Some(format!(
                "no image data (Rows={rows}, Columns={columns})"
            )),
            _ => Some("Rows or Columns not present".into()),
        }
    }
}
