//! Size and count bounded disk cache with least-recently-used eviction.

mod journal;

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::DynamicImage;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use self::journal::{JOURNAL_FILE, Journal, JournalRecord};
use super::{DEFAULT_BUFFER_SIZE, TEMP_FILE_SUFFIX, encode_png, write_temp_bytes, write_temp_file};
use crate::domain::errors::DiskCacheError;
use crate::domain::ports::{CopyListener, DiskCache, FileNameGenerator, ImageStream};
use crate::infrastructure::image::Sha256FileNameGenerator;

/// Journal records beyond the live entry count that trigger a compaction.
const REDUNDANT_RECORD_THRESHOLD: usize = 2000;

/// Construction parameters of an [`LruDiskCache`].
#[derive(Clone)]
pub struct LruDiskCacheOptions {
    /// Primary cache directory.
    pub cache_dir: PathBuf,
    /// Directory used if the primary one cannot be opened.
    pub reserve_dir: Option<PathBuf>,
    /// Maximum total bytes. 0 means unbounded.
    pub max_size: u64,
    /// Maximum number of files. 0 means unbounded.
    pub max_file_count: usize,
    /// Maps URIs to file names.
    pub name_generator: Arc<dyn FileNameGenerator>,
}

impl LruDiskCacheOptions {
    /// Creates options for `cache_dir` with no budgets.
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            reserve_dir: None,
            max_size: 0,
            max_file_count: 0,
            name_generator: Arc::new(Sha256FileNameGenerator),
        }
    }

    /// Sets the reserve directory.
    #[must_use]
    pub fn with_reserve_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.reserve_dir = Some(dir.into());
        self
    }

    /// Sets the byte budget.
    #[must_use]
    pub const fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Sets the file count budget.
    #[must_use]
    pub const fn with_max_file_count(mut self, max_file_count: usize) -> Self {
        self.max_file_count = max_file_count;
        self
    }

    /// Sets the file namer.
    #[must_use]
    pub fn with_name_generator(mut self, generator: Arc<dyn FileNameGenerator>) -> Self {
        self.name_generator = generator;
        self
    }
}

impl std::fmt::Debug for LruDiskCacheOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LruDiskCacheOptions")
            .field("cache_dir", &self.cache_dir)
            .field("reserve_dir", &self.reserve_dir)
            .field("max_size", &self.max_size)
            .field("max_file_count", &self.max_file_count)
            .finish_non_exhaustive()
    }
}

struct LruState {
    dir: PathBuf,
    entries: LruCache<String, u64>,
    total_size: u64,
    editing: HashSet<String>,
    journal: Journal,
    records: usize,
}

impl LruState {
    fn open(dir: &Path) -> Result<Self, DiskCacheError> {
        std::fs::create_dir_all(dir).map_err(|source| DiskCacheError::Directory {
            path: dir.to_path_buf(),
            source,
        })?;
        remove_stray_temp_files(dir);

        let replay = match Journal::replay(dir) {
            Ok(replay) => replay,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Disk cache journal is corrupt, removing cache contents");
                remove_dir_contents(dir)?;
                None
            }
        };

        let Some(replay) = replay else {
            let journal = Journal::rewrite(dir, std::iter::empty(), std::iter::empty())?;
            debug!(dir = %dir.display(), "Created new disk cache journal");
            return Ok(Self {
                dir: dir.to_path_buf(),
                entries: LruCache::unbounded(),
                total_size: 0,
                editing: HashSet::new(),
                journal,
                records: 1,
            });
        };

        for key in &replay.abandoned {
            remove_file_quietly(&dir.join(key));
        }
        let mut entries = LruCache::unbounded();
        let mut total_size = 0;
        for (key, len) in replay.entries {
            total_size += len;
            entries.put(key, len);
        }

        let (journal, records) = if replay.truncated || !replay.abandoned.is_empty() {
            let journal = Journal::rewrite(dir, entries.iter().rev(), std::iter::empty())?;
            (journal, entries.len() + 1)
        } else {
            (Journal::open_append(dir)?, replay.records)
        };
        info!(
            dir = %dir.display(),
            entries = entries.len(),
            total_size,
            "Opened disk cache"
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            entries,
            total_size,
            editing: HashSet::new(),
            journal,
            records,
        })
    }

    fn record(&mut self, record: &JournalRecord) {
        if let Err(e) = self.journal.append(record) {
            warn!(journal = %self.journal.path().display(), error = %e, "Failed to append to disk cache journal");
        }
        self.records += 1;
    }

    fn drop_entry(&mut self, key: &str) -> Option<u64> {
        let len = self.entries.pop(key)?;
        self.total_size -= len;
        remove_file_quietly(&self.dir.join(key));
        self.record(&JournalRecord::Remove {
            key: key.to_string(),
        });
        Some(len)
    }

    fn trim_to_size(&mut self, max_size: u64, max_file_count: usize) {
        while (max_size > 0 && self.total_size > max_size)
            || (max_file_count > 0 && self.entries.len() > max_file_count)
        {
            let Some((key, len)) = self.entries.pop_lru() else {
                break;
            };
            self.total_size -= len;
            remove_file_quietly(&self.dir.join(&key));
            self.record(&JournalRecord::Remove { key: key.clone() });
            debug!(key = %key, size = len, "Evicted file from disk cache");
        }
    }

    fn compact_if_needed(&mut self) {
        let redundant = self.records.saturating_sub(self.entries.len() + 1);
        if redundant < REDUNDANT_RECORD_THRESHOLD || redundant < self.entries.len() {
            return;
        }
        match Journal::rewrite(&self.dir, self.entries.iter().rev(), self.editing.iter()) {
            Ok(journal) => {
                self.journal = journal;
                self.records = self.entries.len() + self.editing.len() + 1;
                debug!(dropped = redundant, "Compacted disk cache journal");
            }
            Err(e) => warn!(error = %e, "Failed to compact disk cache journal"),
        }
    }
}

type SharedState = Arc<Mutex<Option<LruState>>>;

/// Journal-backed disk cache bounded by total bytes and file count.
///
/// Eviction runs after every commit, so once `save` returns the budgets hold
/// again. Journal and file operations run on the blocking thread pool.
pub struct LruDiskCache {
    options: LruDiskCacheOptions,
    buffer_size: usize,
    state: SharedState,
}

impl LruDiskCache {
    /// Opens or creates the cache.
    ///
    /// # Errors
    /// Returns error if neither the primary nor the reserve directory can hold a cache.
    pub fn open(options: LruDiskCacheOptions) -> Result<Self, DiskCacheError> {
        let mut state = Self::open_state(&options)?;
        state.trim_to_size(options.max_size, options.max_file_count);
        Ok(Self {
            options,
            buffer_size: DEFAULT_BUFFER_SIZE,
            state: Arc::new(Mutex::new(Some(state))),
        })
    }

    fn open_state(options: &LruDiskCacheOptions) -> Result<LruState, DiskCacheError> {
        match LruState::open(&options.cache_dir) {
            Ok(state) => Ok(state),
            Err(e) => {
                let Some(reserve) = &options.reserve_dir else {
                    return Err(e);
                };
                warn!(
                    dir = %options.cache_dir.display(),
                    reserve = %reserve.display(),
                    error = %e,
                    "Failed to open disk cache, retrying in reserve directory"
                );
                LruState::open(reserve)
            }
        }
    }

    /// Total bytes of committed files.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.state.lock().as_ref().map_or(0, |state| state.total_size)
    }

    /// Number of committed files.
    #[must_use]
    pub fn file_count(&self) -> usize {
        self.state
            .lock()
            .as_ref()
            .map_or(0, |state| state.entries.len())
    }

    fn key_for(&self, uri: &str) -> String {
        self.options.name_generator.generate(uri)
    }

    /// Runs `op` against the cache state on the blocking pool.
    async fn blocking<T, F>(&self, op: F) -> Option<T>
    where
        F: FnOnce(&mut Option<LruState>) -> T + Send + 'static,
        T: Send + 'static,
    {
        run_blocking(Arc::clone(&self.state), op).await
    }

    /// Claims `key` for writing. The claim is released by the returned edit.
    async fn begin_edit(&self, key: &str) -> Option<Edit> {
        let dir = {
            let mut guard = self.state.lock();
            let state = guard.as_mut()?;
            if !state.editing.insert(key.to_string()) {
                return None;
            }
            state.dir.clone()
        };
        let edit = Edit {
            state: Arc::clone(&self.state),
            key: key.to_string(),
            dir,
            limits: (self.options.max_size, self.options.max_file_count),
            finished: false,
        };
        let dirty = JournalRecord::Dirty {
            key: key.to_string(),
        };
        self.blocking(move |state| {
            if let Some(state) = state.as_mut() {
                state.record(&dirty);
            }
        })
        .await;
        Some(edit)
    }
}

async fn run_blocking<T, F>(state: SharedState, op: F) -> Option<T>
where
    F: FnOnce(&mut Option<LruState>) -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(move || op(&mut *state.lock())).await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(error = %e, "Disk cache operation failed");
            None
        }
    }
}

impl LruState {
    fn lookup(&mut self, key: &str) -> Option<PathBuf> {
        self.entries.get(key)?;
        let path = self.dir.join(key);
        if !path.is_file() {
            warn!(key, "Disk cache file vanished, dropping entry");
            self.drop_entry(key);
            return None;
        }
        self.record(&JournalRecord::Read {
            key: key.to_string(),
        });
        self.compact_if_needed();
        Some(path)
    }

    fn commit(
        &mut self,
        key: &str,
        temp: tempfile::TempPath,
        len: u64,
        (max_size, max_file_count): (u64, usize),
    ) -> bool {
        self.editing.remove(key);

        let target = self.dir.join(key);
        if let Err(e) = temp.persist(&target) {
            warn!(key, error = %e.error, "Failed to move file into disk cache");
            self.close_edit(key);
            return false;
        }

        if let Some(old) = self.entries.put(key.to_string(), len) {
            self.total_size -= old;
        }
        self.total_size += len;
        self.record(&JournalRecord::Clean {
            key: key.to_string(),
            len,
        });
        trace!(key, size = len, "Committed disk cache entry");

        self.trim_to_size(max_size, max_file_count);
        self.compact_if_needed();
        true
    }

    fn abort(&mut self, key: &str) {
        self.editing.remove(key);
        self.close_edit(key);
    }

    /// Ends an edit without new data: the previous version, if any, stays readable.
    fn close_edit(&mut self, key: &str) {
        let record = match self.entries.peek(key) {
            Some(len) => JournalRecord::Clean {
                key: key.to_string(),
                len: *len,
            },
            None => JournalRecord::Remove {
                key: key.to_string(),
            },
        };
        self.record(&record);
    }
}

/// An open edit. Dropping it without committing or aborting aborts the edit.
struct Edit {
    state: SharedState,
    key: String,
    dir: PathBuf,
    limits: (u64, usize),
    finished: bool,
}

impl Edit {
    async fn commit(mut self, temp: tempfile::TempPath, len: u64) -> bool {
        self.finished = true;
        let key = self.key.clone();
        let limits = self.limits;
        run_blocking(Arc::clone(&self.state), move |state| {
            state
                .as_mut()
                .is_some_and(|state| state.commit(&key, temp, len, limits))
        })
        .await
        .unwrap_or(false)
    }

    async fn abort(mut self) {
        self.finished = true;
        let key = self.key.clone();
        run_blocking(Arc::clone(&self.state), move |state| {
            if let Some(state) = state.as_mut() {
                state.abort(&key);
            }
        })
        .await;
    }
}

impl Drop for Edit {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let state = Arc::clone(&self.state);
        let key = std::mem::take(&mut self.key);
        let abort = move || {
            if let Some(state) = state.lock().as_mut() {
                state.abort(&key);
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(abort);
            }
            Err(_) => abort(),
        }
    }
}

#[async_trait::async_trait]
impl DiskCache for LruDiskCache {
    fn directory(&self) -> PathBuf {
        self.state
            .lock()
            .as_ref()
            .map_or_else(|| self.options.cache_dir.clone(), |state| state.dir.clone())
    }

    async fn get(&self, uri: &str) -> Option<PathBuf> {
        let key = self.key_for(uri);
        self.blocking(move |state| state.as_mut().and_then(|state| state.lookup(&key)))
            .await
            .flatten()
    }

    async fn save(
        &self,
        uri: &str,
        stream: ImageStream,
        listener: &mut dyn CopyListener,
    ) -> bool {
        let key = self.key_for(uri);
        let Some(edit) = self.begin_edit(&key).await else {
            debug!(uri, "Disk cache entry is already being written");
            return false;
        };

        match write_temp_file(&edit.dir, &key, stream, listener, self.buffer_size).await {
            Ok(Some((temp, len))) => edit.commit(temp, len).await,
            Ok(None) => {
                debug!(uri, "Disk cache write stopped by listener");
                edit.abort().await;
                false
            }
            Err(e) => {
                warn!(uri, error = %e, "Failed to write image to disk cache");
                edit.abort().await;
                false
            }
        }
    }

    async fn save_image(&self, uri: &str, image: &DynamicImage) -> bool {
        let bytes = match encode_png(image).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(uri, error = %e, "Failed to encode image for disk cache");
                return false;
            }
        };
        let key = self.key_for(uri);
        let Some(edit) = self.begin_edit(&key).await else {
            debug!(uri, "Disk cache entry is already being written");
            return false;
        };

        match write_temp_bytes(&edit.dir, &key, bytes).await {
            Ok((temp, len)) => edit.commit(temp, len).await,
            Err(e) => {
                warn!(uri, error = %e, "Failed to write image to disk cache");
                edit.abort().await;
                false
            }
        }
    }

    async fn remove(&self, uri: &str) -> bool {
        let key = self.key_for(uri);
        self.blocking(move |state| {
            let Some(state) = state.as_mut() else {
                return false;
            };
            if state.editing.contains(&key) {
                return false;
            }
            state.drop_entry(&key).is_some()
        })
        .await
        .unwrap_or(false)
    }

    async fn clear(&self) {
        let options = self.options.clone();
        self.blocking(move |state| {
            let dir = state
                .take()
                .map_or_else(|| options.cache_dir.clone(), |state| state.dir);
            if let Err(e) = remove_dir_contents(&dir) {
                warn!(dir = %dir.display(), error = %e, "Failed to clear disk cache");
            }
            match Self::open_state(&options) {
                Ok(reopened) => {
                    *state = Some(reopened);
                    debug!(dir = %dir.display(), "Cleared disk cache");
                }
                Err(e) => warn!(error = %e, "Failed to reopen disk cache after clear"),
            }
        })
        .await;
    }

    async fn close(&self) {
        let closed = self.blocking(|state| state.take().is_some()).await;
        if closed == Some(true) {
            debug!("Closed disk cache");
        }
    }
}

fn remove_file_quietly(path: &Path) {
    if let Err(e) = std::fs::remove_file(path)
        && e.kind() != io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "Failed to delete disk cache file");
    }
}

fn remove_dir_contents(dir: &Path) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

fn remove_stray_temp_files(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let is_temp = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(TEMP_FILE_SUFFIX) && name != JOURNAL_FILE);
        if is_temp {
            remove_file_quietly(&path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mocks::FailingReader;
    use bytes::Bytes;
    use tempfile::TempDir;
    use tokio::io::AsyncWriteExt;

    async fn put(cache: &LruDiskCache, uri: &str, len: usize) -> bool {
        let mut listener = |_: u64, _: u64| true;
        cache
            .save(
                uri,
                ImageStream::from_bytes(Bytes::from(vec![b'x'; len])),
                &mut listener,
            )
            .await
    }

    #[tokio::test]
    async fn test_byte_budget_evicts_least_recently_used() {
        let temp = TempDir::new().unwrap();
        let cache = LruDiskCache::open(LruDiskCacheOptions::new(temp.path()).with_max_size(10))
            .unwrap();

        assert!(put(&cache, "a", 4).await);
        assert!(put(&cache, "b", 4).await);
        assert!(cache.get("a").await.is_some());
        assert!(put(&cache, "c", 4).await);

        assert!(cache.get("b").await.is_none());
        assert!(cache.get("a").await.is_some());
        assert!(cache.get("c").await.is_some());
        assert_eq!(cache.size(), 8);
    }

    #[tokio::test]
    async fn test_count_budget_evicts_oldest() {
        let temp = TempDir::new().unwrap();
        let cache =
            LruDiskCache::open(LruDiskCacheOptions::new(temp.path()).with_max_file_count(2))
                .unwrap();

        for uri in ["a", "b", "c"] {
            assert!(put(&cache, uri, 1).await);
        }

        assert_eq!(cache.file_count(), 2);
        assert!(cache.get("a").await.is_none());
    }

    #[tokio::test]
    async fn test_reopen_restores_entries_and_order() {
        let temp = TempDir::new().unwrap();
        {
            let cache = LruDiskCache::open(LruDiskCacheOptions::new(temp.path())).unwrap();
            put(&cache, "a", 3).await;
            put(&cache, "b", 3).await;
            cache.get("a").await;
            cache.close().await;
        }

        let cache =
            LruDiskCache::open(LruDiskCacheOptions::new(temp.path()).with_max_file_count(1))
                .unwrap();

        assert_eq!(cache.file_count(), 1);
        assert!(cache.get("a").await.is_some());
        assert!(cache.get("b").await.is_none());
    }

    #[tokio::test]
    async fn test_partial_write_is_not_visible() {
        let temp = TempDir::new().unwrap();
        let cache = LruDiskCache::open(LruDiskCacheOptions::new(temp.path())).unwrap();
        let mut listener = |_: u64, _: u64| true;
        let stream = ImageStream::new(FailingReader::new(vec![1; 16]), Some(64));

        assert!(!cache.save("a", stream, &mut listener).await);

        assert!(cache.get("a").await.is_none());
        assert_eq!(cache.file_count(), 0);
        let names: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from(JOURNAL_FILE)]);

        drop(cache);
        let reopened = LruDiskCache::open(LruDiskCacheOptions::new(temp.path())).unwrap();
        assert_eq!(reopened.file_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_rewrite_keeps_previous_version() {
        let temp = TempDir::new().unwrap();
        let cache = LruDiskCache::open(LruDiskCacheOptions::new(temp.path())).unwrap();
        put(&cache, "a", 5).await;
        let mut listener = |_: u64, _: u64| true;

        let stream = ImageStream::new(FailingReader::new(vec![1; 2]), None);
        assert!(!cache.save("a", stream, &mut listener).await);

        let path = cache.get("a").await.unwrap();
        assert_eq!(std::fs::read(path).unwrap().len(), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_edit_of_same_key_is_rejected() {
        let temp = TempDir::new().unwrap();
        let cache = Arc::new(LruDiskCache::open(LruDiskCacheOptions::new(temp.path())).unwrap());
        let (mut writer, reader) = tokio::io::duplex(64);

        let first = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                let mut listener = |_: u64, _: u64| true;
                cache
                    .save("a", ImageStream::new(reader, Some(3)), &mut listener)
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert!(!put(&cache, "a", 1).await);

        writer.write_all(b"abc").await.unwrap();
        drop(writer);
        assert!(first.await.unwrap());
        assert_eq!(cache.size(), 3);
    }

    #[tokio::test]
    async fn test_corrupt_journal_resets_cache() {
        let temp = TempDir::new().unwrap();
        {
            let cache = LruDiskCache::open(LruDiskCacheOptions::new(temp.path())).unwrap();
            put(&cache, "a", 3).await;
        }
        std::fs::write(temp.path().join(JOURNAL_FILE), "not json\nat all\n").unwrap();

        let cache = LruDiskCache::open(LruDiskCacheOptions::new(temp.path())).unwrap();

        assert_eq!(cache.file_count(), 0);
        assert!(put(&cache, "b", 1).await);
    }

    #[tokio::test]
    async fn test_clear_removes_everything_and_stays_usable() {
        let temp = TempDir::new().unwrap();
        let cache = LruDiskCache::open(LruDiskCacheOptions::new(temp.path())).unwrap();
        put(&cache, "a", 3).await;
        put(&cache, "b", 3).await;

        cache.clear().await;

        assert_eq!(cache.file_count(), 0);
        assert!(cache.get("a").await.is_none());
        assert!(put(&cache, "c", 1).await);
        assert!(cache.get("c").await.is_some());
    }

    #[tokio::test]
    async fn test_remove_deletes_file() {
        let temp = TempDir::new().unwrap();
        let cache = LruDiskCache::open(LruDiskCacheOptions::new(temp.path())).unwrap();
        put(&cache, "a", 3).await;
        let path = cache.get("a").await.unwrap();

        assert!(cache.remove("a").await);
        assert!(!path.exists());
        assert!(!cache.remove("a").await);
        assert_eq!(cache.size(), 0);
    }

    #[tokio::test]
    async fn test_journal_is_compacted() {
        let temp = TempDir::new().unwrap();
        let cache = LruDiskCache::open(LruDiskCacheOptions::new(temp.path())).unwrap();
        put(&cache, "a", 1).await;

        for _ in 0..REDUNDANT_RECORD_THRESHOLD + 10 {
            cache.get("a").await;
        }

        let journal = std::fs::read_to_string(temp.path().join(JOURNAL_FILE)).unwrap();
        assert!(journal.lines().count() < 100);
        assert!(cache.get("a").await.is_some());
    }

    #[tokio::test]
    async fn test_reserve_directory_used_when_primary_unusable() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();
        let reserve = temp.path().join("reserve");

        let cache = LruDiskCache::open(
            LruDiskCacheOptions::new(blocker.join("cache")).with_reserve_dir(&reserve),
        )
        .unwrap();

        assert_eq!(cache.directory(), reserve);
        assert!(put(&cache, "a", 1).await);
    }

    #[tokio::test]
    async fn test_cancelled_write_releases_entry() {
        let temp = TempDir::new().unwrap();
        let cache = LruDiskCache::open(LruDiskCacheOptions::new(temp.path())).unwrap();
        let (_writer, reader) = tokio::io::duplex(64);

        let mut listener = |_: u64, _: u64| true;
        let stalled = tokio::time::timeout(
            std::time::Duration::from_millis(20),
            cache.save("a", ImageStream::new(reader, Some(3)), &mut listener),
        )
        .await;
        assert!(stalled.is_err());

        let mut saved = false;
        for _ in 0..50 {
            if put(&cache, "a", 2).await {
                saved = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(saved);
        assert_eq!(cache.size(), 2);
    }
}
