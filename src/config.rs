//! Configuration types for aria-pilot

use crate::error::{Error, Result};
use crate::types::{Category, OwnerId};
use serde::{Deserialize, Serialize};
use std::{
    net::SocketAddr,
    path::{Component, Path, PathBuf},
    time::Duration,
};

/// Download daemon (aria2) connection settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// JSON-RPC endpoint (default: "http://localhost:6800/jsonrpc")
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// RPC secret, sent as the `token:` parameter when set
    #[serde(default)]
    pub rpc_secret: Option<String>,

    /// Interval between batched status polls (default: 10 seconds, 0 means default)
    #[serde(default = "default_polling_interval", with = "duration_serde")]
    pub polling_interval: Duration,

    /// `bt-stop-timeout` for metadata-only jobs (default: 600 seconds)
    #[serde(default = "default_metadata_stop_timeout", with = "duration_serde")]
    pub metadata_stop_timeout: Duration,

    /// `bt-stop-timeout` for bulk transfer jobs (default: 86400 seconds)
    #[serde(default = "default_transfer_stop_timeout", with = "duration_serde")]
    pub transfer_stop_timeout: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            rpc_secret: None,
            polling_interval: default_polling_interval(),
            metadata_stop_timeout: default_metadata_stop_timeout(),
            transfer_stop_timeout: default_transfer_stop_timeout(),
        }
    }
}

impl DaemonConfig {
    /// Polling interval with the zero value replaced by the default
    pub fn effective_polling_interval(&self) -> Duration {
        if self.polling_interval.is_zero() {
            default_polling_interval()
        } else {
            self.polling_interval
        }
    }
}

/// Classification service settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Endpoint accepting the raw metadata artifact
    #[serde(default = "default_classifier_url")]
    pub url: String,

    /// Minimum confidence, in percent, to accept a prediction (default: 50)
    ///
    /// Values above 100 are treated as 100.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: u8,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            url: default_classifier_url(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

impl ClassifierConfig {
    /// Confidence threshold clamped to 100
    pub fn threshold(&self) -> u8 {
        self.confidence_threshold.min(100)
    }
}

/// Category roots and the metadata artifact cache
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Root for series (default: "./downloads/series")
    #[serde(default = "default_series_dir")]
    pub series: PathBuf,

    /// Root for movies (default: "./downloads/movies")
    #[serde(default = "default_movies_dir")]
    pub movies: PathBuf,

    /// Root for everything else (default: "./downloads/general")
    #[serde(default = "default_general_dir")]
    pub general: PathBuf,

    /// Directory the daemon saves metadata artifacts to (default: ".")
    #[serde(default = "default_metadata_dir")]
    pub metadata_dir: PathBuf,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            series: default_series_dir(),
            movies: default_movies_dir(),
            general: default_general_dir(),
            metadata_dir: default_metadata_dir(),
        }
    }
}

impl DirectoryConfig {
    /// Root directory for a category; unresolved categories land in `general`
    pub fn category_root(&self, category: Category) -> &Path {
        match category {
            Category::Series => &self.series,
            Category::Movies => &self.movies,
            Category::General | Category::Unknown => &self.general,
        }
    }

    /// Bulk transfer destination: category root joined with the owner's subdirectory.
    ///
    /// Only plain path components of `subdir` are kept, so it can never
    /// escape the category root.
    pub fn destination(&self, category: Category, subdir: &str) -> PathBuf {
        let mut path = self.category_root(category).to_path_buf();
        for component in Path::new(subdir).components() {
            if let Component::Normal(part) = component {
                path.push(part);
            }
        }
        path
    }

    /// Location of the metadata artifact the daemon saved for `content_hash`
    pub fn artifact_path(&self, content_hash: &str) -> PathBuf {
        self.metadata_dir
            .join(format!("{}.torrent", content_hash.to_lowercase()))
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Outbound notification delivery
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Webhook receiving notifications as JSON; notifications are only logged when unset
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Value of the `Authorization` header sent to the webhook
    #[serde(default)]
    pub auth_header: Option<String>,

    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_webhook_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Retry policy before a notification is dead-lettered
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            auth_header: None,
            timeout: default_webhook_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

/// Task record storage
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Database path (default: "./aria-pilot.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// REST intake settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Serve the REST API (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Address to bind (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Required `X-Api-Key` header value (None = no authentication)
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: default_bind_address(),
            api_key: None,
        }
    }
}

/// Main configuration for the orchestrator
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download daemon connection
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Classification service
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Category roots and metadata cache
    #[serde(default)]
    pub directories: DirectoryConfig,

    /// Task record storage
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Outbound notifications
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Owners allowed to submit jobs (empty = everyone)
    #[serde(default)]
    pub owners: Vec<OwnerId>,

    /// REST intake
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Load a JSON configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| Error::Config {
            message: format!("failed to parse {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the orchestrator cannot start with
    pub fn validate(&self) -> Result<()> {
        if url::Url::parse(&self.daemon.rpc_url).is_err() {
            return Err(Error::Config {
                message: format!("invalid daemon RPC URL '{}'", self.daemon.rpc_url),
                key: Some("daemon.rpc_url".to_string()),
            });
        }
        if url::Url::parse(&self.classifier.url).is_err() {
            return Err(Error::Config {
                message: format!("invalid classifier URL '{}'", self.classifier.url),
                key: Some("classifier.url".to_string()),
            });
        }
        let multiplier = self.notifications.retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(Error::Config {
                message: format!("retry backoff multiplier must be a finite number >= 1, got {multiplier}"),
                key: Some("notifications.retry.backoff_multiplier".to_string()),
            });
        }
        Ok(())
    }

    /// Whether `owner` may use the orchestrator
    pub fn is_authorized(&self, owner: &OwnerId) -> bool {
        self.owners.is_empty() || self.owners.contains(owner)
    }
}

fn default_rpc_url() -> String {
    "http://localhost:6800/jsonrpc".to_string()
}

fn default_polling_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_metadata_stop_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_transfer_stop_timeout() -> Duration {
    Duration::from_secs(86400)
}

fn default_classifier_url() -> String {
    "http://localhost:8000/predict".to_string()
}

fn default_confidence_threshold() -> u8 {
    50
}

fn default_series_dir() -> PathBuf {
    PathBuf::from("./downloads/series")
}

fn default_movies_dir() -> PathBuf {
    PathBuf::from("./downloads/movies")
}

fn default_general_dir() -> PathBuf {
    PathBuf::from("./downloads/general")
}

fn default_metadata_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./aria-pilot.db")
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_webhook_timeout() -> Duration {
    Duration::from_secs(30)
}

// Duration serialization helper (as seconds)
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
