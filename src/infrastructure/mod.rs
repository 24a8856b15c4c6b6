//! Infrastructure layer: caches, transport, decoder and configuration.

/// Application configuration.
pub mod config;
/// Image handling (caches, transport, decoding).
pub mod image;

pub use config::{AppConfig, CliArgs, ConfigError, ConfigStorage, LogLevel, build_configuration};
pub use image::{
    BaseTransport, CacheStats, DefaultImageDecoder, FifoLimitedMemoryCache, LimitedAgeDiskCache,
    LruDiskCache, LruDiskCacheOptions, LruLimitedMemoryCache, UnlimitedDiskCache,
    WeakMemoryCache,
};
