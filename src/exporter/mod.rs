//! Export coordination split into focused submodules.
//!
//! The [`ExportCoordinator`] struct and its methods are organized by concern:
//! - [`registry`] - Set of studies with a build in flight
//! - `trigger` - Cache checks, background build admission and synchronous export
//! - `build` - The fetch, annotate and assemble pipeline of one study
//! - `lifecycle` - Waiting for builds and graceful shutdown
//! - `maintenance` - Cache sweep and precache entry points

mod build;
mod lifecycle;
mod maintenance;
pub mod registry;
mod trigger;


pub use registry::InFlightRegistry;

use crate::annotate::Annotator;
use crate::archive::ArchiveAssembler;
use crate::config::Config;
use crate::error::Result;
use crate::fetcher::InstanceFetcher;
use crate::janitor::CacheJanitor;
use crate::remote::{ImageSource, QueryTarget, StudyQuery, WadoClient};
use crate::resolver::StudyResolver;
use crate::types::{ExportEvent, StudyUid};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Pipeline components shared by every build
#[derive(Clone)]
pub(crate) struct Pipeline {
    pub(crate) resolver: StudyResolver,
    pub(crate) fetcher: InstanceFetcher,
    pub(crate) annotator: Annotator,
    pub(crate) assembler: ArchiveAssembler,
    pub(crate) janitor: CacheJanitor,
}

/// Entry point of the export pipeline (cloneable, all state is shared)
///
/// Deduplicates concurrent builds of the same study, runs accepted builds as
/// tracked background tasks and serves cached archives directly.
#[derive(Clone)]
pub struct ExportCoordinator {
    /// Configuration the coordinator was built from
    pub(crate) config: Arc<Config>,
    /// Resolver, fetcher, annotator, assembler and janitor
    pub(crate) pipeline: Pipeline,
    /// Studies with a background build in progress
    pub(crate) registry: InFlightRegistry,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<ExportEvent>,
    /// Background builds, awaited on shutdown
    pub(crate) builds: TaskTracker,
    /// Cleared by shutdown; new background builds are refused afterwards
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Cancelled by shutdown, wakes tasks driving the coordinator
    pub(crate) shutdown_signal: CancellationToken,
}

impl ExportCoordinator {
    /// Create a coordinator from validated configuration and its collaborators
    pub fn new(config: Config, query: Arc<dyn StudyQuery>, images: Arc<dyn ImageSource>) -> Result<Self> {
        config.validate()?;

        let annotator = Annotator::from_config(&config.annotation);
        Ok(Self::with_annotator(config, query, images, annotator))
    }

    /// Create a coordinator fetching images from the configured WADO endpoint
    pub fn with_wado(config: Config, query: Arc<dyn StudyQuery>) -> Result<Self> {
        let images = Arc::new(WadoClient::new(&config.wado)?);
        Self::new(config, query, images)
    }

    /// Create a coordinator with an explicit annotator
    ///
    /// The configuration is used as given, without validation.
    pub fn with_annotator(
        config: Config,
        query: Arc<dyn StudyQuery>,
        images: Arc<dyn ImageSource>,
        annotator: Annotator,
    ) -> Self {
        let resolver = StudyResolver::new(query, QueryTarget::from(&config.pacs), config.filter.clone());
        let fetcher = InstanceFetcher::new(images, config.retry.clone(), config.cache.temp_dir.clone());
        let assembler = ArchiveAssembler::new(&config.cache);
        let janitor = CacheJanitor::new(config.cache.cache_dir.clone(), config.cache.retention());

        // Buffer large enough that a slow subscriber only lags on very large studies
        let (event_tx, _rx) = broadcast::channel(1000);

        tracing::info!(
            cache_dir = ?config.cache.cache_dir,
            temp_dir = ?config.cache.temp_dir,
            renderer = annotator.renderer_name(),
            "export coordinator initialized"
        );

        Self {
            config: Arc::new(config),
            pipeline: Pipeline {
                resolver,
                fetcher,
                annotator,
                assembler,
                janitor,
            },
            registry: InFlightRegistry::new(),
            event_tx,
            builds: TaskTracker::new(),
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown_signal: CancellationToken::new(),
        }
    }

    /// Subscribe to pipeline events
    ///
    /// Each subscriber receives every event independently. A subscriber that
    /// falls more than 1000 events behind gets `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<ExportEvent> {
        self.event_tx.subscribe()
    }

    /// Configuration in use
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Read-only access to the study resolver
    pub fn resolver(&self) -> &StudyResolver {
        &self.pipeline.resolver
    }

    /// Whether a background build for `study_uid` is in progress
    pub async fn is_building(&self, study_uid: &StudyUid) -> bool {
        self.registry.contains(study_uid).await
    }

    /// Studies with a background build in progress
    pub async fn in_flight(&self) -> Vec<StudyUid> {
        self.registry.snapshot().await
    }

    /// Send an event to all subscribers; dropped when nobody listens
    pub(crate) fn emit_event(&self, event: ExportEvent) {
        self.event_tx.send(event).ok();
    }
}
