//! Per-URI locks serializing fetches of the same resource.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
struct LockEntry {
    lock: Arc<AsyncMutex<()>>,
    users: usize,
}

type LockTable = Arc<Mutex<HashMap<String, LockEntry>>>;

/// Reference-counted table of async locks keyed by URI.
///
/// An entry lives while at least one task holds or waits for its lock.
#[derive(Clone, Default)]
pub struct UriLockRegistry {
    locks: LockTable,
}

impl UriLockRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the lock of `uri`.
    ///
    /// Dropping the returned future while it waits releases its claim on the entry.
    pub async fn acquire(&self, uri: &str) -> UriLockGuard {
        let (ticket, lock) = {
            let mut locks = self.locks.lock();
            let entry = locks.entry(uri.to_string()).or_default();
            entry.users += 1;
            (
                LockTicket {
                    locks: Arc::clone(&self.locks),
                    uri: uri.to_string(),
                },
                Arc::clone(&entry.lock),
            )
        };
        let guard = lock.lock_owned().await;
        UriLockGuard {
            _guard: guard,
            _ticket: ticket,
        }
    }

    /// Returns true if some task currently holds the lock of `uri`.
    #[must_use]
    pub fn is_locked(&self, uri: &str) -> bool {
        self.locks
            .lock()
            .get(uri)
            .is_some_and(|entry| entry.lock.try_lock().is_err())
    }

    /// Number of URIs with holders or waiters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    /// Returns true if no lock is held or awaited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

struct LockTicket {
    locks: LockTable,
    uri: String,
}

impl Drop for LockTicket {
    fn drop(&mut self) {
        let mut locks = self.locks.lock();
        if let Some(entry) = locks.get_mut(&self.uri) {
            entry.users -= 1;
            if entry.users == 0 {
                locks.remove(&self.uri);
            }
        }
    }
}

/// Holds the lock of one URI until dropped.
pub struct UriLockGuard {
    // Field order matters: the lock is released before the table entry.
    _guard: OwnedMutexGuard<()>,
    _ticket: LockTicket,
}

impl std::fmt::Debug for UriLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UriLockGuard")
            .field("uri", &self._ticket.uri)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_uri_is_exclusive() {
        let registry = UriLockRegistry::new();
        let guard = registry.acquire("http://x/a").await;
        assert!(registry.is_locked("http://x/a"));

        let mut waiter = tokio_test::task::spawn(registry.acquire("http://x/a"));
        tokio_test::assert_pending!(waiter.poll());

        drop(guard);
        assert!(waiter.is_woken());
        let again = tokio_test::assert_ready!(waiter.poll());
        assert!(format!("{again:?}").contains("http://x/a"));
    }

    #[tokio::test]
    async fn test_different_uris_do_not_block() {
        let registry = UriLockRegistry::new();
        let _a = registry.acquire("http://x/a").await;
        let b = tokio::time::timeout(Duration::from_millis(50), registry.acquire("http://x/b")).await;
        assert!(b.is_ok());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_entry_removed_after_last_user() {
        let registry = UriLockRegistry::new();
        let guard = registry.acquire("http://x/a").await;

        // A waiter that gives up must not leak its entry.
        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), registry.acquire("http://x/a")).await;
        assert!(abandoned.is_err());
        assert_eq!(registry.len(), 1);

        drop(guard);
        assert!(registry.is_empty());
        assert!(!registry.is_locked("http://x/a"));
    }
}
