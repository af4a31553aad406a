//! Configuration surface.
//!
//! Every field has a default, so an empty JSON object (or no file at all)
//! is a valid configuration. Durations are written in seconds.
//!
//! ```json
//! {
//!   "store": { "dir": "/var/lib/warden", "max_bytes": 5242880 },
//!   "retention": { "horizon": 86400, "interval": 3600 },
//!   "limits": { "model_invoke": { "capacity": 10, "window": 60 } },
//!   "poll": { "max_attempts": 60 }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app::poller::PollPolicy;
use crate::domain::{MediaType, OperationCategory};

/// Default maximum upload size (5 MiB).
pub const DEFAULT_MAX_BYTES: u64 = 5 * 1024 * 1024;
/// Default maximum raster size per axis.
pub const DEFAULT_MAX_DIMENSION: u32 = 4000;
/// Default maximum length of free text forwarded to external services.
pub const DEFAULT_MAX_TEXT_LEN: usize = 500;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Where artifact bytes are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Owner-only files in `StoreConfig::dir`.
    #[default]
    Disk,
    /// Bytes held in the registry; nothing touches the filesystem.
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub dir: PathBuf,
    pub mode: StorageMode,
    pub max_bytes: u64,
    pub max_dimension: u32,
    pub allowed: Vec<MediaType>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir().join("warden_secure_files"),
            mode: StorageMode::Disk,
            max_bytes: DEFAULT_MAX_BYTES,
            max_dimension: DEFAULT_MAX_DIMENSION,
            allowed: MediaType::ALL.to_vec(),
        }
    }
}

impl StoreConfig {
    /// Disk-backed store rooted at `dir`, other limits default.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ..Self::default()
        }
    }

    /// Memory-backed store, other limits default.
    pub fn in_memory() -> Self {
        Self {
            mode: StorageMode::Memory,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Artifacts idle for longer than this are purged.
    #[serde(with = "secs")]
    pub horizon: Duration,
    /// Delay between sweeps while healthy.
    #[serde(with = "secs")]
    pub interval: Duration,
    /// Ceiling for the failure backoff.
    #[serde(with = "secs")]
    pub max_backoff: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            horizon: Duration::from_secs(24 * 3600),
            interval: Duration::from_secs(3600),
            max_backoff: Duration::from_secs(4 * 3600),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitConfig {
    pub capacity: u32,
    #[serde(with = "secs")]
    pub window: Duration,
    /// Quota is reported as low once fewer than this many calls remain.
    #[serde(default)]
    pub warn_below: u32,
}

impl LimitConfig {
    pub fn new(capacity: u32, window: Duration) -> Self {
        Self {
            capacity,
            window,
            warn_below: 0,
        }
    }

    pub fn warn_below(mut self, remaining: u32) -> Self {
        self.warn_below = remaining;
        self
    }
}

fn default_limits() -> BTreeMap<OperationCategory, LimitConfig> {
    let mut limits = BTreeMap::new();
    limits.insert(
        OperationCategory::model_invoke(),
        LimitConfig::new(10, Duration::from_secs(60)).warn_below(5),
    );
    limits.insert(
        OperationCategory::task_submit(),
        LimitConfig::new(5, Duration::from_secs(3600)).warn_below(2),
    );
    limits
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub retention: RetentionConfig,
    pub limits: BTreeMap<OperationCategory, LimitConfig>,
    pub poll: PollPolicy,
    pub max_text_len: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            retention: RetentionConfig::default(),
            limits: default_limits(),
            poll: PollPolicy::default(),
            max_text_len: DEFAULT_MAX_TEXT_LEN,
        }
    }
}

impl AppConfig {
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Load `path` if given, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    /// Fail-fast checks for values that would make a component useless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.allowed.is_empty() {
            return Err(ConfigError::Invalid("store.allowed is empty".into()));
        }
        if self.store.max_bytes == 0 || self.store.max_dimension == 0 {
            return Err(ConfigError::Invalid(
                "store.max_bytes and store.max_dimension must be non-zero".into(),
            ));
        }
        if self.retention.interval.is_zero() {
            return Err(ConfigError::Invalid("retention.interval must be non-zero".into()));
        }
        if self.retention.max_backoff < self.retention.interval {
            return Err(ConfigError::Invalid(
                "retention.max_backoff must be >= retention.interval".into(),
            ));
        }
        for (category, limit) in &self.limits {
            if limit.capacity == 0 || limit.window.is_zero() {
                return Err(ConfigError::Invalid(format!(
                    "limits.{category}: capacity and window must be non-zero"
                )));
            }
        }
        self.poll.validate().map_err(ConfigError::Invalid)
    }
}

/// `Duration` <-> seconds (fractional allowed on input).
pub(crate) mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if d.subsec_nanos() == 0 {
            serializer.serialize_u64(d.as_secs())
        } else {
            serializer.serialize_f64(d.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
