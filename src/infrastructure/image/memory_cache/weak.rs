//! Memory cache that never keeps images alive on its own.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use image::DynamicImage;
use parking_lot::Mutex;
use tracing::trace;

use crate::domain::ports::MemoryCache;

/// Cache of weak references.
///
/// An entry stays readable only while something else still holds the image.
#[derive(Default)]
pub struct WeakMemoryCache {
    entries: Mutex<WeakEntries>,
}

#[derive(Default)]
struct WeakEntries {
    map: HashMap<String, Weak<DynamicImage>>,
    // Map size after the last sweep of reclaimed entries.
    swept_len: usize,
}

/// Maps smaller than this are never swept.
const MIN_SWEEP_LEN: usize = 64;

impl WeakEntries {
    /// Drops reclaimed entries once the map has doubled since the last sweep.
    fn sweep_if_grown(&mut self) {
        if self.map.len() < MIN_SWEEP_LEN.max(self.swept_len * 2) {
            return;
        }
        let before = self.map.len();
        self.map.retain(|_, value| value.strong_count() > 0);
        self.swept_len = self.map.len();
        trace!(reclaimed = before - self.swept_len, "Swept weak entries");
    }
}

impl WeakMemoryCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryCache for WeakMemoryCache {
    fn put(&self, key: &str, value: Arc<DynamicImage>) -> bool {
        let mut entries = self.entries.lock();
        entries.map.insert(key.to_string(), Arc::downgrade(&value));
        entries.sweep_if_grown();
        true
    }

    fn get(&self, key: &str) -> Option<Arc<DynamicImage>> {
        let mut entries = self.entries.lock();
        let image = entries.map.get(key)?.upgrade();
        if image.is_none() {
            trace!(key, "Weak entry was reclaimed");
            entries.map.remove(key);
        }
        image
    }

    fn remove(&self, key: &str) -> Option<Arc<DynamicImage>> {
        self.entries.lock().map.remove(key)?.upgrade()
    }

    fn keys(&self) -> HashSet<String> {
        self.entries
            .lock()
            .map
            .iter()
            .filter(|(_, value)| value.strong_count() > 0)
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.map.clear();
        entries.swept_len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_readable_while_held() {
        let cache = WeakMemoryCache::new();
        let image = Arc::new(DynamicImage::new_rgb8(4, 4));

        assert!(cache.put("a", Arc::clone(&image)));
        assert!(cache.get("a").is_some());
        assert_eq!(cache.keys().len(), 1);
    }

    #[test]
    fn test_entry_gone_after_last_holder_drops() {
        let cache = WeakMemoryCache::new();
        let image = Arc::new(DynamicImage::new_rgb8(4, 4));
        cache.put("a", Arc::clone(&image));

        drop(image);

        assert!(cache.get("a").is_none());
        assert!(cache.keys().is_empty());
    }

    #[test]
    fn test_reclaimed_entries_do_not_accumulate() {
        let cache = WeakMemoryCache::new();
        let kept = Arc::new(DynamicImage::new_rgb8(2, 2));
        cache.put("kept", Arc::clone(&kept));

        for i in 0..10_000 {
            cache.put(&format!("dropped-{i}"), Arc::new(DynamicImage::new_rgb8(1, 1)));
        }

        let tracked = cache.entries.lock().map.len();
        assert!(tracked <= 2 * MIN_SWEEP_LEN, "tracked {tracked} entries");
        assert_eq!(cache.keys(), HashSet::from(["kept".to_string()]));
        assert!(cache.get("kept").is_some());
    }
}
