//! Core types for study-export

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Identifier of a study (StudyInstanceUID), trimmed of surrounding whitespace
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StudyUid(String);

impl StudyUid {
    /// Normalize and validate a study identifier
    pub fn new(raw: impl AsRef<str>) -> Result<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("study UID is empty".into()));
        }
        // The UID becomes part of a file name in the flat cache directory
        if trimmed.contains(['/', '\\']) || trimmed == "." || trimmed == ".." {
            return Err(Error::InvalidInput(format!(
                "study UID contains a path separator: {trimmed}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Borrow the identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StudyUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for StudyUid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for StudyUid {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<StudyUid> for String {
    fn from(uid: StudyUid) -> Self {
        uid.0
    }
}

/// Study-level facts needed to key the cache
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyMetadata {
    /// Study identifier
    pub study_uid: StudyUid,
    /// StudyDate as reported by the archive (YYYYMMDD)
    pub study_date: String,
}

/// One raw row of an image-level query, before filtering
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    /// SeriesInstanceUID
    pub series_uid: Option<String>,
    /// SOPInstanceUID
    pub sop_uid: Option<String>,
    /// Modality (CT, MR, SR, ...)
    pub modality: Option<String>,
    /// Image rows
    pub rows: Option<u32>,
    /// Image columns
    pub columns: Option<u32>,
    /// BitsStored
    pub bits_stored: Option<u16>,
}

/// Reference to one renderable instance of a study
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceRef {
    /// SeriesInstanceUID
    pub series_uid: String,
    /// SOPInstanceUID
    pub sop_uid: String,
}

/// Descriptive fields burned into an image's corners
///
/// Values are kept as the archive returned them; person names are in DICOM
/// `Family^Given^Middle` form and dates in `YYYYMMDD`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceMetadata {
    /// PatientName
    pub patient_name: String,
    /// PatientID
    pub patient_id: String,
    /// StudyDate
    pub study_date: String,
    /// Modality
    pub modality: String,
    /// StudyDescription
    pub study_description: String,
    /// BodyPartExamined
    pub body_part: String,
    /// SeriesNumber
    pub series_number: String,
    /// InstanceNumber
    pub instance_number: String,
    /// ReferringPhysicianName
    pub referring_physician: String,
    /// InstitutionName
    pub institution: String,
}

/// A rendered image fetched for an in-progress build
#[derive(Clone, Debug)]
pub struct FetchedImage {
    /// Instance the image belongs to
    pub instance: InstanceRef,
    /// Location of the JPEG in the study's working directory
    pub path: PathBuf,
    /// Size of the JPEG as fetched
    pub bytes: u64,
}

/// Result of [`check_or_trigger`](crate::ExportCoordinator::check_or_trigger)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome {
    /// The archive is cached and can be served
    Ready {
        /// Archive location
        path: PathBuf,
    },
    /// A build for this study is already running
    AlreadyBuilding,
    /// The archive holds fewer instances than the caller expects
    InsufficientInstances {
        /// Instance count the caller asked for
        expected: usize,
        /// Instance count the archive reported
        available: usize,
    },
    /// A background build was accepted
    Enqueued,
}

/// Pipeline notifications broadcast to subscribers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExportEvent {
    /// A background build was accepted
    BuildQueued {
        /// Study being built
        study_uid: StudyUid,
    },
    /// Instance listing finished and fetching begins
    BuildStarted {
        /// Study being built
        study_uid: StudyUid,
        /// Number of renderable instances
        instances: usize,
    },
    /// One instance was dropped from the build
    InstanceSkipped {
        /// Study being built
        study_uid: StudyUid,
        /// Dropped instance
        sop_uid: String,
        /// Why it was dropped
        reason: String,
    },
    /// The archive was written
    BuildCompleted {
        /// Study that was built
        study_uid: StudyUid,
        /// Archive location
        path: PathBuf,
        /// Number of images in the archive
        images: usize,
    },
    /// The build aborted without an archive
    BuildFailed {
        /// Study that failed
        study_uid: StudyUid,
        /// Error message
        error: String,
    },
    /// A cache sweep finished
    CacheSwept {
        /// Number of expired archives deleted
        deleted: usize,
    },
    /// A precache batch finished
    PrecacheCompleted {
        /// StudyDate that was precached
        date: String,
        /// Studies built or already cached
        built: usize,
        /// Studies that failed
        failed: usize,
    },
}
