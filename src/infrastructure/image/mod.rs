//! Image handling infrastructure.
//!
//! This module provides:
//! - Memory caches (weak, FIFO and LRU bounded)
//! - Disk caches (unlimited, age limited, journal-backed LRU)
//! - The default transport and decoder

pub mod decoder;
pub mod disk_cache;
pub mod file_naming;
pub mod memory_cache;
pub mod transport;

pub use decoder::DefaultImageDecoder;
pub use disk_cache::{LimitedAgeDiskCache, LruDiskCache, LruDiskCacheOptions, UnlimitedDiskCache};
pub use file_naming::{HashCodeFileNameGenerator, Sha256FileNameGenerator};
pub use memory_cache::{
    CacheStats, FifoLimitedMemoryCache, LimitedMemoryCache, LruLimitedMemoryCache,
    WeakMemoryCache,
};
pub use transport::{BaseTransport, NetworkDeniedTransport, SlowNetworkTransport};
