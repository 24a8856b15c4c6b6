//! Application configuration.

pub mod app_config;
pub mod args;
pub mod factory;
pub mod storage;

pub use app_config::{
    AppConfig, DiskCacheConfig, DiskCacheKind, EngineConfig, LogLevel, MemoryCacheConfig,
    MemoryCacheKind, NetworkConfig,
};
pub use args::CliArgs;
pub use factory::{build_configuration, build_disk_cache, build_memory_cache};
pub use storage::{ConfigError, ConfigStorage};
