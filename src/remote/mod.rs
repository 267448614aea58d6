//! Collaborator contracts for the remote imaging archive
//!
//! The pipeline talks to the archive through two seams:
//! - [`StudyQuery`] - C-FIND-style query exchanges at study or image level
//! - [`ImageSource`] - WADO-style retrieval of one rendered JPEG
//!
//! The query exchange itself is provided by the embedding application. A
//! WADO-URI implementation of [`ImageSource`] ships in [`wado`].

use crate::config::PacsConfig;
use crate::error::Result;
use crate::types::{InstanceMetadata, InstanceRecord};
use async_trait::async_trait;
use thiserror::Error;

/// HTTP WADO-URI image source
pub mod wado;

pub use wado::WadoClient;

/// Addressing for a query association
///
/// Carries both application entity titles explicitly so implementations never
/// have to guess which side is which.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryTarget {
    /// Archive hostname
    pub host: String,
    /// Archive port
    pub port: u16,
    /// AE title presented by this service
    pub calling_ae_title: String,
    /// AE title of the remote archive
    pub called_ae_title: String,
}

impl From<&PacsConfig> for QueryTarget {
    fn from(config: &PacsConfig) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            calling_ae_title: config.calling_ae_title.clone(),
            called_ae_title: config.called_ae_title.clone(),
        }
    }
}

/// Query exchanges against the remote archive
///
/// Implementations should return [`Error::Query`](crate::Error::Query) when an
/// association cannot be established. Every method is read-only.
#[async_trait]
pub trait StudyQuery: Send + Sync {
    /// Study-level query for the StudyDate of one study
    ///
    /// Returns `Ok(None)` when the archive answers without a date.
    async fn find_study_date(&self, target: &QueryTarget, study_uid: &str)
    -> Result<Option<String>>;

    /// Image-level query listing every instance of a study, unfiltered
    async fn find_instances(
        &self,
        target: &QueryTarget,
        study_uid: &str,
    ) -> Result<Vec<InstanceRecord>>;

    /// Image-level query for one instance's descriptive fields
    async fn find_instance_metadata(
        &self,
        target: &QueryTarget,
        study_uid: &str,
        series_uid: &str,
        sop_uid: &str,
    ) -> Result<Option<InstanceMetadata>>;

    /// Study-level query for every study with the given StudyDate (YYYYMMDD)
    async fn find_studies_on_date(&self, target: &QueryTarget, date: &str)
    -> Result<Vec<String>>;
}

/// Why one rendered-image request failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    /// Non-success HTTP status
    #[error("unexpected status {0}")]
    Status(u16),
    /// Response was not a JPEG
    #[error("unexpected content type {0:?}")]
    ContentType(String),
    /// Request did not complete within the per-attempt timeout
    #[error("request timed out")]
    Timeout,
    /// Connection or protocol failure
    #[error("transport error: {0}")]
    Transport(String),
}

/// Retrieval of one rendered JPEG per instance
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Fetch the rendered JPEG bytes of one instance (single attempt)
    async fn fetch_rendered(
        &self,
        study_uid: &str,
        series_uid: &str,
        sop_uid: &str,
    ) -> std::result::Result<Vec<u8>, FetchFailure>;
}
