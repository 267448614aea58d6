//! Configuration types for study-export

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

/// Remote archive (PACS) query endpoint
///
/// Both application entity titles are explicit: `calling_ae_title` names this
/// service, `called_ae_title` names the remote archive. The same pair is used
/// for every query kind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacsConfig {
    /// Archive hostname (default: "localhost")
    #[serde(default = "default_pacs_host")]
    pub host: String,

    /// Archive DIMSE port (default: 11112)
    #[serde(default = "default_pacs_port")]
    pub port: u16,

    /// AE title of the remote archive (default: "DCM4CHEE")
    #[serde(default = "default_called_ae_title")]
    pub called_ae_title: String,

    /// AE title this service presents (default: "JPEGEXPORT")
    #[serde(default = "default_calling_ae_title")]
    pub calling_ae_title: String,
}

impl Default for PacsConfig {
    fn default() -> Self {
        Self {
            host: default_pacs_host(),
            port: default_pacs_port(),
            called_ae_title: default_called_ae_title(),
            calling_ae_title: default_calling_ae_title(),
        }
    }
}

/// WADO-URI endpoint used to fetch rendered JPEGs
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WadoConfig {
    /// Base URL of the WADO-URI service (default: "http://localhost:8000/wado")
    #[serde(default = "default_wado_base_url")]
    pub base_url: String,

    /// Per-request timeout (default: 10 seconds)
    #[serde(default = "default_wado_timeout", with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for WadoConfig {
    fn default() -> Self {
        Self {
            base_url: default_wado_base_url(),
            timeout: default_wado_timeout(),
        }
    }
}

/// Retry policy for per-instance fetches
///
/// Attempts are separated by a constant delay; there is no backoff.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay between attempts (default: 5 seconds)
    #[serde(default = "default_retry_delay", with = "duration_serde")]
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay: default_retry_delay(),
        }
    }
}

impl RetryConfig {
    /// Policy without any wait between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::ZERO,
        }
    }
}

/// Cache and working directory settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Flat directory holding finished archives (default: "./cache")
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Working directory for per-instance JPEGs (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Days an archive is kept after its study date (default: 1)
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Remove a study's working directory after its archive is written (default: true)
    #[serde(default = "default_true")]
    pub delete_temp_files: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            temp_dir: default_temp_dir(),
            retention_days: default_retention_days(),
            delete_temp_files: true,
        }
    }
}

impl CacheConfig {
    /// Retention window as a chrono duration
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

/// Filter applied to strict instance listings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceFilterConfig {
    /// Modalities that never render to an image (default: SR, PR)
    #[serde(default = "default_excluded_modalities")]
    pub excluded_modalities: Vec<String>,

    /// Bit depths the renderer cannot handle (default: none)
    ///
    /// Setting this to `[10]` restores the historical 10-bit exclusion.
    #[serde(default)]
    pub excluded_bits_stored: Vec<u16>,
}

impl Default for InstanceFilterConfig {
    fn default() -> Self {
        Self {
            excluded_modalities: default_excluded_modalities(),
            excluded_bits_stored: Vec::new(),
        }
    }
}

/// Corner annotation settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationConfig {
    /// TrueType font used for annotations (None = built-in bitmap font)
    #[serde(default)]
    pub font_path: Option<PathBuf>,

    /// RGB text color (default: white)
    #[serde(default = "default_annotation_color")]
    pub color: [u8; 3],

    /// JPEG quality for re-encoded images, 1-100 (default: 90)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            font_path: None,
            color: default_annotation_color(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

/// In-process periodic triggers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// Local hour of the daily cache sweep (default: 2)
    #[serde(default = "default_cleanup_hour")]
    pub cleanup_hour: u32,

    /// Minute of the daily cache sweep (default: 0)
    #[serde(default)]
    pub cleanup_minute: u32,

    /// Precache today's studies every interval (None = disabled)
    #[serde(default, with = "optional_duration_serde")]
    pub precache_interval: Option<Duration>,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            cleanup_hour: default_cleanup_hour(),
            cleanup_minute: 0,
            precache_interval: None,
        }
    }
}

/// Main configuration for the export service
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Remote archive query endpoint
    #[serde(default)]
    pub pacs: PacsConfig,

    /// WADO-URI fetch endpoint
    #[serde(default)]
    pub wado: WadoConfig,

    /// Per-instance fetch retry policy
    #[serde(default)]
    pub retry: RetryConfig,

    /// Cache and working directories
    #[serde(default)]
    pub cache: CacheConfig,

    /// Strict listing filter
    #[serde(default)]
    pub filter: InstanceFilterConfig,

    /// Corner annotations
    #[serde(default)]
    pub annotation: AnnotationConfig,

    /// Periodic triggers
    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    /// How long shutdown waits for running builds (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pacs: PacsConfig::default(),
            wado: WadoConfig::default(),
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            filter: InstanceFilterConfig::default(),
            annotation: AnnotationConfig::default(),
            maintenance: MaintenanceConfig::default(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl Config {
    /// Build a configuration from environment variables.
    ///
    /// A `.env` file in the working directory is loaded first. Unset
    /// variables keep their defaults; malformed values are rejected.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Some(host) = env_string("PACS_HOST") {
            config.pacs.host = host;
        }
        if let Some(port) = env_parse("PACS_PORT")? {
            config.pacs.port = port;
        }
        if let Some(title) = env_string("PACS_AETITLE") {
            config.pacs.called_ae_title = title;
        }
        if let Some(title) = env_string("CALLING_AETITLE") {
            config.pacs.calling_ae_title = title;
        }
        if let Some(url) = env_string("DICOM_SERVER_BASE_URL") {
            config.wado.base_url = url;
        }
        if let Some(attempts) = env_parse("MAX_RETRIES")? {
            config.retry.max_attempts = attempts;
        }
        if let Some(secs) = env_parse::<u64>("RETRY_DELAY_SECONDS")? {
            config.retry.delay = Duration::from_secs(secs);
        }
        if let Some(dir) = env_string("JPEG_ZIP_CACHE_DIR") {
            config.cache.cache_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_string("JPEG_TEMP_DIR") {
            config.cache.temp_dir = PathBuf::from(dir);
        }
        if let Some(days) = env_parse("CACHE_EXPIRY_DAYS")? {
            config.cache.retention_days = days;
        }
        if let Some(flag) = env_string("DELETE_TEMP_JPEGS") {
            config.cache.delete_temp_files = flag.eq_ignore_ascii_case("true");
        }
        if let Some(minutes) = env_parse::<u64>("PRECACHE_INTERVAL_MINUTES")? {
            config.maintenance.precache_interval =
                (minutes > 0).then(|| Duration::from_secs(minutes * 60));
        }
        if let Some(font) = env_string("ANNOTATION_FONT") {
            config.annotation.font_path = Some(PathBuf::from(font));
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(Error::config(
                "at least one fetch attempt is required",
                "retry.max_attempts",
            ));
        }
        if self.cache.retention_days == 0 {
            return Err(Error::config(
                "retention must be at least one day",
                "cache.retention_days",
            ));
        }
        if !(1..=100).contains(&self.annotation.jpeg_quality) {
            return Err(Error::config(
                "JPEG quality must be between 1 and 100",
                "annotation.jpeg_quality",
            ));
        }
        if self.maintenance.cleanup_hour > 23 || self.maintenance.cleanup_minute > 59 {
            return Err(Error::config(
                "cleanup time must be a valid HH:MM",
                "maintenance.cleanup_hour",
            ));
        }
        if url::Url::parse(&self.wado.base_url).is_err() {
            return Err(Error::config(
                format!("invalid WADO base URL: {}", self.wado.base_url),
                "wado.base_url",
            ));
        }
        Ok(())
    }
}

fn env_string(key: &str) -> Option<String> {
    dotenvy::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::config(format!("{key} has invalid value {raw:?}"), key)),
        None => Ok(None),
    }
}

fn default_pacs_host() -> String {
    "localhost".to_string()
}

fn default_pacs_port() -> u16 {
    11112
}

fn default_called_ae_title() -> String {
    "DCM4CHEE".to_string()
}

fn default_calling_ae_title() -> String {
    "JPEGEXPORT".to_string()
}

fn default_wado_base_url() -> String {
    "http://localhost:8000/wado".to_string()
}

fn default_wado_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_retention_days() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_excluded_modalities() -> Vec<String> {
    vec!["SR".to_string(), "PR".to_string()]
}

fn default_annotation_color() -> [u8; 3] {
    [255, 255, 255]
}

fn default_jpeg_quality() -> u8 {
    90
}

fn default_cleanup_hour() -> u32 {
    2
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Optional Duration serialization helper
mod optional_duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&d.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = Option::<u64>::deserialize(deserializer)?;
        Ok(secs.map(Duration::from_secs))
    }
}
