//! Centralized configuration for the model core.
//!
//! Constant tables hold the built-in defaults for downloads, the index and the
//! model pool. [`ModelsSettings`] holds the user-editable part (remote
//! repository, proxy, credentials) and is persisted as JSON.

use crate::error::{ModelsError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    /// Whole-request timeout for a single artifact GET.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
    /// Attempts per artifact, including the first one.
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_BASE_DELAY: Duration = Duration::from_secs(2);
    pub const DOWNLOAD_CHUNK_SIZE: usize = 64 * 1024;
    /// Minimum growth in bytes between two progress events for one transfer.
    pub const PROGRESS_STEP_BYTES: u64 = 1024 * 1024;
    /// Appended to the destination while a transfer is in progress.
    pub const DOWNLOAD_TEMP_SUFFIX: &'static str = ".part";
    /// Sidecar holding the SHA-256 of an artifact, next to it on the remote.
    pub const CHECKSUM_SUFFIX: &'static str = ".sha256";
    pub const USER_AGENT: &'static str = "recmodels/0.3";
}

/// Repository layout and download scheduling.
pub struct RepositoryConfig;

impl RepositoryConfig {
    pub const DEFAULT_REMOTE_URL: &'static str =
        "https://download.eclipse.org/recommenders/models/photon/";
    pub const REPOSITORY_DIR_NAME: &'static str = "repository";
    pub const INDEX_DIR_NAME: &'static str = "index";
    /// Transfers running at once. Further requests queue.
    pub const DOWNLOAD_WORKERS: usize = 1;
    /// How long a failed resolution is remembered before the remote is asked again.
    pub const NEGATIVE_CACHE_TTL: Duration = Duration::from_secs(3600);
    pub const NEGATIVE_CACHE_CAPACITY: u64 = 10_000;
    /// Upper bound for `resolve_blocking`.
    pub const BLOCKING_RESOLVE_TIMEOUT: Duration = Duration::from_secs(600);
    pub const LOCK_FILE_SUFFIX: &'static str = ".lock";
    /// Events buffered per subscriber before the oldest are dropped.
    pub const EVENT_CHANNEL_CAPACITY: usize = 64;

    // Coordinate of the published index archive.
    pub const INDEX_GROUP_ID: &'static str = "org.eclipse.recommenders";
    pub const INDEX_ARTIFACT_ID: &'static str = "index";
    pub const INDEX_EXTENSION: &'static str = "zip";
    pub const INDEX_VERSION: &'static str = "0.0.0";
}

/// Coordinate catalog and index queries.
pub struct IndexConfig;

impl IndexConfig {
    pub const CATALOG_FILE_NAME: &'static str = "catalog.db";
    /// Most model archives returned for one `groupId:artifactId`.
    pub const CANDIDATE_QUERY_LIMIT: usize = 100;
    /// Rows fetched by a fingerprint or symbolic name lookup.
    pub const REVERSE_LOOKUP_LIMIT: usize = 5;
    /// Staging directories for index updates are named `<prefix><millis>`.
    pub const STAGING_DIR_PREFIX: &'static str = "index.staging-";
}

/// Model pool defaults.
pub struct PoolConfig;

impl PoolConfig {
    pub const MAX_TOTAL: usize = 100;
    pub const MAX_TOTAL_PER_KEY: usize = 1;
    pub const MAX_IDLE_PER_KEY: usize = 1;
    pub const EVICTION_INTERVAL: Duration = Duration::from_secs(60);
    pub const MIN_IDLE_TIME: Duration = Duration::from_secs(300);
}

/// Model types (archive classifiers) shipped by the recommenders.
pub struct ModelTypes;

impl ModelTypes {
    pub const CALL: &'static str = "call";
    pub const OVERRIDES: &'static str = "ovrd";
    pub const CONSTRUCTORS: &'static str = "ctor";
    pub const SELFCALLS: &'static str = "selfc";
    pub const STATICS: &'static str = "statics";
}

/// Proxy settings for the remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxySettings {
    /// Proxy scheme, e.g. `http` or `socks5`.
    #[serde(rename = "type")]
    pub kind: String,
    pub host: String,
    pub port: u16,
    /// Proxy credentials. Used only when both are set.
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl ProxySettings {
    /// Proxy URL in the form reqwest expects.
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.kind, self.host, self.port)
    }
}

/// Basic authentication against the remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSettings {
    pub user: String,
    pub password: String,
}

/// User-editable settings for the model repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelsSettings {
    /// Base URL of the Maven-layout model repository. `file://` URLs are
    /// read from disk.
    pub remote_url: String,
    /// Proxy for HTTP remotes.
    pub proxy: Option<ProxySettings>,
    /// Basic auth credentials for the remote.
    pub auth: Option<AuthSettings>,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Concurrent transfers. Zero is treated as one.
    pub download_workers: usize,
    /// Check downloads against a published `.sha256` sidecar when present.
    pub verify_checksums: bool,
}

impl Default for ModelsSettings {
    fn default() -> Self {
        Self {
            remote_url: RepositoryConfig::DEFAULT_REMOTE_URL.to_string(),
            proxy: None,
            auth: None,
            request_timeout_secs: NetworkConfig::REQUEST_TIMEOUT.as_secs(),
            download_workers: RepositoryConfig::DOWNLOAD_WORKERS,
            verify_checksums: true,
        }
    }
}

impl ModelsSettings {
    /// Load settings from a JSON file, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents =
            std::fs::read_to_string(path).map_err(|e| ModelsError::io_with_path(e, path))?;
        let settings: Self = serde_json::from_str(&contents).map_err(|e| ModelsError::Json {
            message: format!("Failed to parse {}: {}", path.display(), e),
            source: Some(e),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    /// Save settings atomically (temp file in the same directory, then rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| ModelsError::io_with_path(e, parent))?;

        let serialized = serde_json::to_string_pretty(self)?;
        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|e| ModelsError::io_with_path(e, parent))?;
        temp.write_all(serialized.as_bytes())
            .map_err(|e| ModelsError::io_with_path(e, temp.path().to_path_buf()))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| ModelsError::io_with_path(e, temp.path().to_path_buf()))?;
        temp.persist(path)
            .map_err(|e| ModelsError::io_with_path(e.error, path))?;
        Ok(())
    }

    /// Request timeout as a duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.remote_url.trim().is_empty() {
            return Err(ModelsError::Config {
                message: "remoteUrl must not be empty".to_string(),
            });
        }
        if url::Url::parse(&self.remote_url).is_err() {
            return Err(ModelsError::Config {
                message: format!("remoteUrl is not a valid URL: {}", self.remote_url),
            });
        }
        if self.download_workers == 0 {
            return Err(ModelsError::Config {
                message: "downloadWorkers must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
