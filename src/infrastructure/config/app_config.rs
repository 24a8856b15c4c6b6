//! Application configuration.

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::args::CliArgs;
use crate::domain::entities::ImageSize;

const APP_NAME: &str = "pixcache";
const APP_QUALIFIER: &str = "dev";
const APP_ORGANIZATION: &str = "pixcache";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl LogLevel {
    /// Converts to tracing level.
    #[must_use]
    pub const fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration, read from `config.toml` and overridden from the CLI.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(skip)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Memory cache configuration.
    #[serde(default)]
    pub memory_cache: MemoryCacheConfig,

    /// Disk cache configuration.
    #[serde(default)]
    pub disk_cache: DiskCacheConfig,

    /// Engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Network configuration.
    #[serde(default)]
    pub network: NetworkConfig,
}

/// Memory cache retention strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCacheKind {
    /// Size-bounded, evicts the oldest insertion.
    Fifo,
    /// Size-bounded, evicts the least recently used.
    #[default]
    Lru,
    /// Unbounded, holds nothing alive by itself.
    Weak,
}

/// Memory cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCacheConfig {
    /// Retention strategy.
    #[serde(default)]
    pub kind: MemoryCacheKind,

    /// Strong tier budget in bytes of decoded pixels.
    #[serde(default = "default_memory_max_bytes")]
    pub max_bytes: usize,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            kind: MemoryCacheKind::default(),
            max_bytes: default_memory_max_bytes(),
        }
    }
}

/// Disk cache eviction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiskCacheKind {
    /// Journal-backed, bounded by total size and file count.
    #[default]
    Lru,
    /// Never evicts.
    Unlimited,
    /// Expires files by age.
    LimitedAge,
}

/// Disk cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskCacheConfig {
    /// Eviction strategy.
    #[serde(default)]
    pub kind: DiskCacheKind,

    /// Cache directory. Defaults to the platform cache directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Used when `directory` cannot be created.
    #[serde(default)]
    pub reserve_directory: Option<PathBuf>,

    /// Total size budget for `lru`. 0 means unbounded.
    #[serde(default = "default_disk_max_size")]
    pub max_size_bytes: u64,

    /// File count budget for `lru`. 0 means unbounded.
    #[serde(default)]
    pub max_file_count: usize,

    /// Maximum file age in seconds for `limited_age`.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

impl Default for DiskCacheConfig {
    fn default() -> Self {
        Self {
            kind: DiskCacheKind::default(),
            directory: None,
            reserve_directory: None,
            max_size_bytes: default_disk_max_size(),
            max_file_count: 0,
            max_age_secs: default_max_age_secs(),
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Concurrent loads per pool.
    #[serde(default = "default_thread_pool_size")]
    pub thread_pool_size: usize,

    /// Decode size for targets that report no size.
    #[serde(default = "default_max_memory_image_size")]
    pub max_image_size_for_memory_cache: ImageSize,

    /// Downloaded files are shrunk to fit this size. 0x0 keeps them as they are.
    #[serde(default)]
    pub max_image_size_for_disk_cache: ImageSize,

    /// Keep decoded images in memory by default.
    #[serde(default = "default_true")]
    pub cache_in_memory: bool,

    /// Keep downloaded bytes on disk by default.
    #[serde(default = "default_true")]
    pub cache_on_disk: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thread_pool_size: default_thread_pool_size(),
            max_image_size_for_memory_cache: default_max_memory_image_size(),
            max_image_size_for_disk_cache: ImageSize::default(),
            cache_in_memory: true,
            cache_on_disk: true,
        }
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Read timeout in seconds.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Refuse network downloads; only cached images load.
    #[serde(default)]
    pub deny_network: bool,

    /// Buffer whole bodies before decoding.
    #[serde(default)]
    pub slow_network: bool,
}

impl NetworkConfig {
    /// Connect timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Read timeout.
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            deny_network: false,
            slow_network: false,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_memory_max_bytes() -> usize {
    8 * 1024 * 1024
}

fn default_disk_max_size() -> u64 {
    50 * 1024 * 1024
}

fn default_max_age_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_thread_pool_size() -> usize {
    3
}

fn default_max_memory_image_size() -> ImageSize {
    ImageSize::new(1920, 1080)
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_read_timeout_secs() -> u64 {
    20
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(cache_dir) = &args.cache_dir {
            self.disk_cache.directory = Some(cache_dir.clone());
        }
        if let Some(threads) = args.threads {
            self.engine.thread_pool_size = threads;
        }
        if args.deny_network {
            self.network.deny_network = true;
        }
        if args.slow_network {
            self.network.slow_network = true;
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("pixcache.log"))
    }

    /// Returns default image cache directory.
    #[must_use]
    pub fn default_cache_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.cache_dir().join("images"))
    }

    /// Returns effective config path.
    #[must_use]
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Self::default_config_path)
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }

    /// Returns effective image cache directory.
    #[must_use]
    pub fn effective_cache_dir(&self) -> Option<PathBuf> {
        self.disk_cache
            .directory
            .clone()
            .or_else(Self::default_cache_dir)
    }
}
