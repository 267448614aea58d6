//! Shared in-memory archive for unit tests.

use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result};
use crate::remote::{FetchFailure, ImageSource, QueryTarget, StudyQuery};
use crate::types::{InstanceMetadata, InstanceRecord};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// A renderable CT instance row
pub(crate) fn image_record(series_uid: &str, sop_uid: &str) -> InstanceRecord {
    InstanceRecord {
        series_uid: Some(series_uid.to_string()),
        sop_uid: Some(sop_uid.to_string()),
        modality: Some("CT".to_string()),
        rows: Some(48),
        columns: Some(64),
        bits_stored: Some(12),
    }
}

/// Encode a solid gray JPEG of the given size
pub(crate) fn test_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([40, 40, 40]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}

#[derive(Default)]
struct ArchiveState {
    study_dates: HashMap<String, String>,
    instances: HashMap<String, Vec<InstanceRecord>>,
    studies_by_date: HashMap<String, Vec<String>>,
    metadata: HashMap<String, InstanceMetadata>,
    failing_sops: HashSet<String>,
    flaky_sops: HashMap<String, usize>,
    fetches_by_sop: HashMap<String, usize>,
}

/// Fake remote archive implementing both collaborator traits
#[derive(Clone)]
pub(crate) struct FakeArchive {
    state: Arc<Mutex<ArchiveState>>,
    unreachable: Arc<AtomicBool>,
    metadata_unavailable: Arc<AtomicBool>,
    fetch_calls: Arc<AtomicUsize>,
    instance_queries: Arc<AtomicUsize>,
    gate: Arc<watch::Sender<bool>>,
    jpeg: Arc<Vec<u8>>,
}

impl FakeArchive {
    pub(crate) fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            state: Arc::new(Mutex::new(ArchiveState::default())),
            unreachable: Arc::new(AtomicBool::new(false)),
            metadata_unavailable: Arc::new(AtomicBool::new(false)),
            fetch_calls: Arc::new(AtomicUsize::new(0)),
            instance_queries: Arc::new(AtomicUsize::new(0)),
            gate: Arc::new(gate),
            jpeg: Arc::new(test_jpeg(64, 48)),
        }
    }

    pub(crate) fn with_study(self, study_uid: &str, date: &str, records: Vec<InstanceRecord>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.study_dates.insert(study_uid.to_string(), date.to_string());
            state.instances.insert(study_uid.to_string(), records);
        }
        self
    }

    pub(crate) fn with_studies_on_date(self, date: &str, study_uids: &[&str]) -> Self {
        self.state.lock().unwrap().studies_by_date.insert(
            date.to_string(),
            study_uids.iter().map(|s| s.to_string()).collect(),
        );
        self
    }

    pub(crate) fn with_metadata(self, sop_uid: &str, metadata: InstanceMetadata) -> Self {
        self.state
            .lock()
            .unwrap()
            .metadata
            .insert(sop_uid.to_string(), metadata);
        self
    }

    /// Every fetch of this instance fails
    pub(crate) fn failing(self, sop_uid: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_sops
            .insert(sop_uid.to_string());
        self
    }

    /// The first `failures` fetches of this instance fail
    pub(crate) fn flaky(self, sop_uid: &str, failures: usize) -> Self {
        self.state
            .lock()
            .unwrap()
            .flaky_sops
            .insert(sop_uid.to_string(), failures);
        self
    }

    /// Every query fails as if no association could be established
    pub(crate) fn unreachable(self) -> Self {
        self.unreachable.store(true, Ordering::SeqCst);
        self
    }

    /// Descriptive queries fail while study and image queries succeed
    pub(crate) fn metadata_unavailable(self) -> Self {
        self.metadata_unavailable.store(true, Ordering::SeqCst);
        self
    }

    /// Block fetches until [`release_fetches`](Self::release_fetches)
    pub(crate) fn hold_fetches(&self) {
        self.gate.send_replace(false);
    }

    pub(crate) fn release_fetches(&self) {
        self.gate.send_replace(true);
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fetch_calls_for(&self, sop_uid: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .fetches_by_sop
            .get(sop_uid)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn instance_queries(&self) -> usize {
        self.instance_queries.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(Error::Query("association rejected".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StudyQuery for FakeArchive {
    async fn find_study_date(&self, _target: &QueryTarget, study_uid: &str) -> Result<Option<String>> {
        self.check_reachable()?;
        Ok(self.state.lock().unwrap().study_dates.get(study_uid).cloned())
    }

    async fn find_instances(&self, _target: &QueryTarget, study_uid: &str) -> Result<Vec<InstanceRecord>> {
        self.check_reachable()?;
        self.instance_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state
            .lock()
            .unwrap()
            .instances
            .get(study_uid)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_instance_metadata(
        &self,
        _target: &QueryTarget,
        _study_uid: &str,
        _series_uid: &str,
        sop_uid: &str,
    ) -> Result<Option<InstanceMetadata>> {
        self.check_reachable()?;
        if self.metadata_unavailable.load(Ordering::SeqCst) {
            return Err(Error::Query("metadata query timed out".into()));
        }
        Ok(self.state.lock().unwrap().metadata.get(sop_uid).cloned())
    }

    async fn find_studies_on_date(&self, _target: &QueryTarget, date: &str) -> Result<Vec<String>> {
        self.check_reachable()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .studies_by_date
            .get(date)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl ImageSource for FakeArchive {
    async fn fetch_rendered(
        &self,
        _study_uid: &str,
        _series_uid: &str,
        sop_uid: &str,
    ) -> std::result::Result<Vec<u8>, FetchFailure> {
        let mut gate = self.gate.subscribe();
        gate.wait_for(|open| *open)
            .await
            .map_err(|e| FetchFailure::Transport(e.to_string()))?;

        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        let calls = {
            let entry = state.fetches_by_sop.entry(sop_uid.to_string()).or_default();
            *entry += 1;
            *entry
        };

        if state.failing_sops.contains(sop_uid) {
            return Err(FetchFailure::Status(503));
        }
        if let Some(failures) = state.flaky_sops.get(sop_uid) {
            if calls <= *failures {
                return Err(FetchFailure::Timeout);
            }
        }
        Ok(self.jpeg.as_ref().clone())
    }
}

/// Configuration rooted in a fresh temp directory, with instant retries
pub(crate) fn test_config(root: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.cache.cache_dir = root.join("cache");
    config.cache.temp_dir = root.join("temp");
    config.retry = RetryConfig::immediate(3);
    config
}
