//! In-memory query collaborator, WADO mock server and configuration fixtures

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use study_export::{
    Config, InstanceMetadata, InstanceRecord, QueryTarget, Result, RetryConfig, StudyQuery,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Study-level facts served by [`StaticArchive`]
#[derive(Clone, Debug)]
pub struct StudyFixture {
    pub study_uid: String,
    pub study_date: String,
    pub instances: Vec<InstanceRecord>,
}

/// Query collaborator answering from a fixed set of studies
#[derive(Default)]
pub struct StaticArchive {
    studies: Mutex<HashMap<String, StudyFixture>>,
    metadata: Mutex<HashMap<String, InstanceMetadata>>,
}

impl StaticArchive {
    pub fn new(studies: Vec<StudyFixture>) -> Self {
        let archive = Self::default();
        for study in studies {
            archive
                .studies
                .lock()
                .unwrap()
                .insert(study.study_uid.clone(), study);
        }
        archive
    }

    pub fn with_metadata(self, sop_uid: &str, metadata: InstanceMetadata) -> Self {
        self.metadata
            .lock()
            .unwrap()
            .insert(sop_uid.to_string(), metadata);
        self
    }
}

#[async_trait]
impl StudyQuery for StaticArchive {
    async fn find_study_date(&self, _target: &QueryTarget, study_uid: &str) -> Result<Option<String>> {
        Ok(self
            .studies
            .lock()
            .unwrap()
            .get(study_uid)
            .map(|s| s.study_date.clone()))
    }

    async fn find_instances(&self, _target: &QueryTarget, study_uid: &str) -> Result<Vec<InstanceRecord>> {
        Ok(self
            .studies
            .lock()
            .unwrap()
            .get(study_uid)
            .map(|s| s.instances.clone())
            .unwrap_or_default())
    }

    async fn find_instance_metadata(
        &self,
        _target: &QueryTarget,
        _study_uid: &str,
        _series_uid: &str,
        sop_uid: &str,
    ) -> Result<Option<InstanceMetadata>> {
        Ok(self.metadata.lock().unwrap().get(sop_uid).cloned())
    }

    async fn find_studies_on_date(&self, _target: &QueryTarget, date: &str) -> Result<Vec<String>> {
        let mut uids: Vec<String> = self
            .studies
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.study_date == date)
            .map(|s| s.study_uid.clone())
            .collect();
        uids.sort();
        Ok(uids)
    }
}

/// Renderable CT instance
pub fn ct_instance(series_uid: &str, sop_uid: &str) -> InstanceRecord {
    InstanceRecord {
        series_uid: Some(series_uid.to_string()),
        sop_uid: Some(sop_uid.to_string()),
        modality: Some("CT".to_string()),
        rows: Some(256),
        columns: Some(256),
        bits_stored: Some(12),
    }
}

/// Gray JPEG of the given size
pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([60, 60, 60]));
    let mut out = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}

/// WADO endpoint serving a JPEG for every object except `failing`
pub async fn wado_server(failing: &[&str]) -> MockServer {
    let server = MockServer::start().await;

    for sop_uid in failing {
        Mock::given(method("GET"))
            .and(path("/wado"))
            .and(query_param("objectUID", *sop_uid))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
    }

    Mock::given(method("GET"))
        .and(path("/wado"))
        .and(query_param("requestType", "WADO"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(jpeg(256, 256), "image/jpeg"))
        .mount(&server)
        .await;

    server
}

/// Configuration pointing at `server`, with cache and temp dirs under `root`
pub fn config_for(server: &MockServer, root: &Path) -> Config {
    let mut config = Config::default();
    config.wado.base_url = format!("{}/wado", server.uri());
    config.wado.timeout = Duration::from_secs(5);
    config.retry = RetryConfig::immediate(2);
    config.cache.cache_dir = root.join("cache");
    config.cache.temp_dir = root.join("temp");
    config
}
