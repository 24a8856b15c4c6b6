//! In-memory decoded image caches.

mod limited;
mod weak;

use std::sync::Arc;

use image::DynamicImage;
use tracing::debug;

use crate::domain::entities::CacheKey;
use crate::domain::ports::MemoryCache;

pub use limited::{
    EvictionPolicy, FifoLimitedMemoryCache, FifoPolicy, LimitedMemoryCache,
    LruLimitedMemoryCache, LruPolicy, MAX_NORMAL_CACHE_SIZE,
};
pub use weak::WeakMemoryCache;

/// Decoded size of an image in bytes.
#[must_use]
pub fn decoded_size(image: &DynamicImage) -> usize {
    image.as_bytes().len()
}

/// Returns every cached image decoded from `uri`, at any target size.
#[must_use]
pub fn find_cached_images_for_uri(cache: &dyn MemoryCache, uri: &str) -> Vec<Arc<DynamicImage>> {
    find_cache_keys_for_uri(cache, uri)
        .iter()
        .filter_map(|key| cache.get(key))
        .collect()
}

/// Returns every cache key built for `uri`.
#[must_use]
pub fn find_cache_keys_for_uri(cache: &dyn MemoryCache, uri: &str) -> Vec<String> {
    cache
        .keys()
        .into_iter()
        .filter(|key| CacheKey::matches_uri(key, uri))
        .collect()
}

/// Removes every size variant of `uri`. Returns how many keys were removed.
pub fn remove_from_cache(cache: &dyn MemoryCache, uri: &str) -> usize {
    let keys = find_cache_keys_for_uri(cache, uri);
    for key in &keys {
        cache.remove(key);
    }
    if !keys.is_empty() {
        debug!(uri, count = keys.len(), "Removed image variants from memory cache");
    }
    keys.len()
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached keys.
    pub size: usize,
    /// Bytes pinned by the strong tier.
    pub bytes: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images ({} bytes), {:.1}% hit rate ({} hits, {} misses)",
            self.size, self.bytes, self.hit_rate, self.hits, self.misses
        )
    }
}
