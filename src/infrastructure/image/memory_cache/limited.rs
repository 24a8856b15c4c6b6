//! Size-bounded memory cache with a pluggable eviction order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use image::DynamicImage;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::{CacheStats, WeakMemoryCache, decoded_size};
use crate::domain::ports::MemoryCache;

/// Budget above which a warning is logged, since large strong tiers starve the process.
pub const MAX_NORMAL_CACHE_SIZE: usize = 16 * 1024 * 1024;

/// Chooses which strong entry to drop when the budget is exceeded.
pub trait EvictionPolicy: Send + Default {
    /// A key entered the strong tier.
    fn admitted(&mut self, key: &str);
    /// A strong entry was read.
    fn accessed(&mut self, key: &str);
    /// A key left the strong tier.
    fn removed(&mut self, key: &str);
    /// Returns the next key to evict.
    fn next_victim(&mut self) -> Option<String>;
    /// Forgets every key.
    fn clear(&mut self);
}

/// Evicts in insertion order. Reads do not refresh an entry.
#[derive(Debug, Default)]
pub struct FifoPolicy {
    queue: VecDeque<String>,
}

impl EvictionPolicy for FifoPolicy {
    fn admitted(&mut self, key: &str) {
        self.queue.push_back(key.to_string());
    }

    fn accessed(&mut self, _key: &str) {}

    fn removed(&mut self, key: &str) {
        self.queue.retain(|queued| queued != key);
    }

    fn next_victim(&mut self) -> Option<String> {
        self.queue.pop_front()
    }

    fn clear(&mut self) {
        self.queue.clear();
    }
}

/// Evicts the least recently used entry.
pub struct LruPolicy {
    order: LruCache<String, ()>,
}

impl Default for LruPolicy {
    fn default() -> Self {
        Self {
            order: LruCache::unbounded(),
        }
    }
}

impl EvictionPolicy for LruPolicy {
    fn admitted(&mut self, key: &str) {
        self.order.put(key.to_string(), ());
    }

    fn accessed(&mut self, key: &str) {
        self.order.promote(key);
    }

    fn removed(&mut self, key: &str) {
        self.order.pop(key);
    }

    fn next_victim(&mut self) -> Option<String> {
        self.order.pop_lru().map(|(key, ())| key)
    }

    fn clear(&mut self) {
        self.order.clear();
    }
}

struct StrongTier<P> {
    entries: HashMap<String, (Arc<DynamicImage>, usize)>,
    current_size: usize,
    policy: P,
}

/// Two-tier memory cache.
///
/// Every entry is reachable through a weak tier. A subset is also pinned by a
/// strong tier whose total decoded size never exceeds `size_limit`.
pub struct LimitedMemoryCache<P> {
    size_limit: usize,
    weak: WeakMemoryCache,
    strong: Mutex<StrongTier<P>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Limited cache evicting oldest insertions first.
pub type FifoLimitedMemoryCache = LimitedMemoryCache<FifoPolicy>;

/// Limited cache evicting least recently used entries first.
pub type LruLimitedMemoryCache = LimitedMemoryCache<LruPolicy>;

impl<P: EvictionPolicy> LimitedMemoryCache<P> {
    /// Creates a cache pinning at most `size_limit` bytes of decoded pixels.
    #[must_use]
    pub fn new(size_limit: usize) -> Self {
        if size_limit > MAX_NORMAL_CACHE_SIZE {
            warn!(
                size_limit,
                max_normal = MAX_NORMAL_CACHE_SIZE,
                "Memory cache limit is large, consider a smaller budget"
            );
        }
        Self {
            size_limit,
            weak: WeakMemoryCache::new(),
            strong: Mutex::new(StrongTier {
                entries: HashMap::new(),
                current_size: 0,
                policy: P::default(),
            }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the strong tier budget in bytes.
    #[must_use]
    pub const fn size_limit(&self) -> usize {
        self.size_limit
    }

    /// Returns the bytes currently pinned by the strong tier.
    #[must_use]
    pub fn current_size(&self) -> usize {
        self.strong.lock().current_size
    }

    /// Returns true if `key` is pinned by the strong tier.
    #[must_use]
    pub fn is_pinned(&self, key: &str) -> bool {
        self.strong.lock().entries.contains_key(key)
    }

    /// Returns hit and miss counters.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                (hits as f64 / total as f64) * 100.0
            } else {
                0.0
            },
            size: self.len(),
            bytes: self.current_size(),
        }
    }
}

impl<P: EvictionPolicy> MemoryCache for LimitedMemoryCache<P> {
    fn put(&self, key: &str, value: Arc<DynamicImage>) -> bool {
        let size = decoded_size(&value);
        let mut guard = self.strong.lock();
        let tier = &mut *guard;

        if let Some((_, old_size)) = tier.entries.remove(key) {
            tier.current_size -= old_size;
            tier.policy.removed(key);
        }

        let pinned = size < self.size_limit;
        if pinned {
            while tier.current_size + size > self.size_limit {
                let Some(victim) = tier.policy.next_victim() else {
                    break;
                };
                if let Some((_, freed)) = tier.entries.remove(&victim) {
                    tier.current_size -= freed;
                    trace!(key = %victim, freed, "Evicted image from strong tier");
                }
            }
            tier.entries
                .insert(key.to_string(), (Arc::clone(&value), size));
            tier.current_size += size;
            tier.policy.admitted(key);
        } else {
            debug!(
                key,
                size,
                size_limit = self.size_limit,
                "Image exceeds memory budget, keeping weak reference only"
            );
        }

        self.weak.put(key, value);
        pinned
    }

    fn get(&self, key: &str) -> Option<Arc<DynamicImage>> {
        let pinned = {
            let mut guard = self.strong.lock();
            let tier = &mut *guard;
            match tier.entries.get(key) {
                Some((image, _)) => {
                    let image = Arc::clone(image);
                    tier.policy.accessed(key);
                    Some(image)
                }
                None => None,
            }
        };

        let image = pinned.or_else(|| self.weak.get(key));
        if image.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key, "Memory cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key, "Memory cache miss");
        }
        image
    }

    fn remove(&self, key: &str) -> Option<Arc<DynamicImage>> {
        let pinned = {
            let mut guard = self.strong.lock();
            let tier = &mut *guard;
            tier.entries.remove(key).map(|(image, size)| {
                tier.current_size -= size;
                tier.policy.removed(key);
                image
            })
        };
        let weak = self.weak.remove(key);
        pinned.or(weak)
    }

    fn keys(&self) -> HashSet<String> {
        let mut keys = self.weak.keys();
        keys.extend(self.strong.lock().entries.keys().cloned());
        keys
    }

    fn clear(&self) {
        {
            let mut tier = self.strong.lock();
            tier.entries.clear();
            tier.current_size = 0;
            tier.policy.clear();
        }
        self.weak.clear();
        debug!("Cleared memory image cache");
    }
}
