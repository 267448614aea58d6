//! WADO-URI image source
//!
//! Asks the archive to render each instance as a JPEG, one `GET` per instance.

use super::{FetchFailure, ImageSource};
use crate::config::WadoConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use tracing::debug;
use url::Url;

const JPEG_CONTENT_TYPE: &str = "image/jpeg";

/// WADO-URI client requesting server-rendered JPEGs
///
/// Each call is a single `GET` bounded by the configured timeout; retrying is
/// the caller's concern.
#[derive(Clone, Debug)]
pub struct WadoClient {
    http: reqwest::Client,
    base_url: Url,
}

impl WadoClient {
    /// Create a client for the configured endpoint
    pub fn new(config: &WadoConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            Error::config(format!("invalid WADO base URL: {e}"), "wado.base_url")
        })?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { http, base_url })
    }

    /// Request URL for one instance
    pub fn instance_url(&self, study_uid: &str, series_uid: &str, sop_uid: &str) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("requestType", "WADO")
            .append_pair("studyUID", study_uid)
            .append_pair("seriesUID", series_uid)
            .append_pair("objectUID", sop_uid)
            .append_pair("contentType", JPEG_CONTENT_TYPE);
        url
    }
}

fn transport_failure(e: reqwest::Error) -> FetchFailure {
    if e.is_timeout() {
        FetchFailure::Timeout
    } else {
        FetchFailure::Transport(e.to_string())
    }
}

#[async_trait]
impl ImageSource for WadoClient {
    async fn fetch_rendered(
        &self,
        study_uid: &str,
        series_uid: &str,
        sop_uid: &str,
    ) -> std::result::Result<Vec<u8>, FetchFailure> {
        let url = self.instance_url(study_uid, series_uid, sop_uid);
        debug!(%url, sop_uid, "requesting rendered JPEG");

        let response = self.http.get(url).send().await.map_err(transport_failure)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchFailure::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let essence = content_type.split(';').next().unwrap_or_default().trim();
        if !essence.eq_ignore_ascii_case(JPEG_CONTENT_TYPE) {
            return Err(FetchFailure::ContentType(content_type));
        }

        let body = response.bytes().await.map_err(transport_failure)?;
        Ok(body.to_vec())
    }
}
