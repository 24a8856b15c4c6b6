//! Port definition for the in-memory image cache.

use std::collections::HashSet;
use std::sync::Arc;

use image::DynamicImage;

/// Thread-safe key to decoded image map.
///
/// Keys are usually [`CacheKey`](crate::domain::entities::CacheKey) strings.
pub trait MemoryCache: Send + Sync {
    /// Stores `value` under `key`. Returns false if the value could not be kept.
    fn put(&self, key: &str, value: Arc<DynamicImage>) -> bool;

    /// Returns the image for `key`, if still cached.
    fn get(&self, key: &str) -> Option<Arc<DynamicImage>>;

    /// Removes and returns the image for `key`.
    fn remove(&self, key: &str) -> Option<Arc<DynamicImage>>;

    /// Returns a snapshot of all cached keys.
    fn keys(&self) -> HashSet<String>;

    /// Removes every entry.
    fn clear(&self);

    /// Returns the number of cached keys.
    fn len(&self) -> usize {
        self.keys().len()
    }

    /// Returns true if the cache holds nothing.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
