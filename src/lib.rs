//! # study-export
//!
//! On-demand export of DICOM studies as ZIP archives of annotated JPEGs, with
//! a file-based cache in front of the remote imaging archive.
//!
//! ## Design Philosophy
//!
//! study-export is designed to be:
//! - **Library-first** - No server or CLI, the embedding application routes requests
//! - **Cache-first** - A study is built at most once and served from disk afterwards
//! - **Failure tolerant** - One broken image never sinks the archive of a whole study
//! - **Event-driven** - Consumers subscribe to build events, no polling required
//!
//! The query exchange with the archive is abstracted behind [`StudyQuery`];
//! rendered images come from any [`ImageSource`], with a WADO-URI client
//! provided.
//!
//! ## Quick Start
//!
//! ```no_run
//! use study_export::{CheckOutcome, Config, ExportCoordinator, StudyQuery, StudyUid};
//! use std::sync::Arc;
//!
//! # async fn example(query: Arc<dyn StudyQuery>) -> Result<(), Box<dyn std::error::Error>> {
//! let coordinator = ExportCoordinator::with_wado(Config::from_env()?, query)?;
//!
//! let mut events = coordinator.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//! });
//!
//! let study = StudyUid::new("1.2.840.113619.2.55.3")?;
//! match coordinator.check_or_trigger(&study, 120).await? {
//!     CheckOutcome::Ready { path } => println!("serve {}", path.display()),
//!     other => println!("not ready yet: {other:?}"),
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Corner annotation of fetched images
pub mod annotate;
/// Cache artifact assembly
pub mod archive;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Export coordination (decomposed into focused submodules)
pub mod exporter;
/// Per-instance image retrieval
pub mod fetcher;
/// Cache expiry
pub mod janitor;
/// Periodic cache sweep and precache
pub mod maintenance_task;
/// Batch builds by study date
pub mod precache;
/// Remote archive collaborators
pub mod remote;
/// Study resolution and instance listing
pub mod resolver;
/// Fixed-delay retry
pub mod retry;
/// Core types and events
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use annotate::{Annotator, BitmapRenderer, TextRenderer, TrueTypeRenderer};
pub use archive::ArchiveAssembler;
pub use config::{Config, RetryConfig};
pub use error::{Error, Result};
pub use exporter::{ExportCoordinator, InFlightRegistry};
pub use fetcher::InstanceFetcher;
pub use janitor::CacheJanitor;
pub use precache::{PrecacheReport, PrecacheScheduler};
pub use remote::{FetchFailure, ImageSource, QueryTarget, StudyQuery, WadoClient};
pub use resolver::StudyResolver;
pub use types::{
    CheckOutcome, ExportEvent, FetchedImage, InstanceMetadata, InstanceRecord, InstanceRef,
    StudyMetadata, StudyUid,
};
