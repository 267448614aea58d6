//! Error types for study-export
//!
//! The taxonomy separates per-instance failures (a single image could not be
//! fetched or decoded) from failures that abort a whole build (the study
//! cannot be resolved, nothing usable was fetched, the archive could not be
//! written). Callers use [`Error::is_per_instance`] to tell them apart without
//! inspecting messages.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for study-export operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for study-export
#[derive(Debug, Error)]
pub enum Error {
    /// The remote archive could not be queried, or returned no study date
    #[error("failed to resolve study {study_uid}: {reason}")]
    Resolution {
        /// Study that could not be resolved
        study_uid: String,
        /// Why resolution failed
        reason: String,
    },

    /// Every fetch attempt for one instance failed
    #[error("fetch for instance {sop_uid} failed after {attempts} attempts: {reason}")]
    FetchExhausted {
        /// SOP instance UID of the image
        sop_uid: String,
        /// Number of attempts made
        attempts: u32,
        /// Failure reason of the last attempt
        reason: String,
    },

    /// A build produced zero usable images
    #[error("no usable images for study {study_uid}")]
    EmptyResult {
        /// Study whose build came up empty
        study_uid: String,
    },

    /// Writing the cache artifact failed
    #[error("failed to persist archive {}: {reason}", path.display())]
    Persistence {
        /// Final artifact path that was being written
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// Malformed identifier or date string
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Query exchange with the remote archive failed
    #[error("query error: {0}")]
    Query(String),

    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "MAX_RETRIES")
        key: Option<String>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Image could not be decoded or encoded
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Shutdown in progress - not accepting new builds
    #[error("shutdown in progress: not accepting new builds")]
    ShuttingDown,
}

impl Error {
    /// Create a configuration error tied to a specific key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }

    /// Whether this failure only affects a single instance of a build.
    ///
    /// Per-instance failures degrade the result set; everything else aborts
    /// the build it occurred in.
    pub fn is_per_instance(&self) -> bool {
        matches!(self, Error::FetchExhausted { .. } | Error::Image(_))
    }
}
