//! Disk cache whose entries expire a fixed time after they were stored.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use filetime::FileTime;
use image::DynamicImage;
use parking_lot::Mutex;
use tokio::fs;
use tracing::{debug, warn};

use super::base::BaseDiskCache;
use crate::domain::ports::{CopyListener, DiskCache, FileNameGenerator, ImageStream};
use crate::infrastructure::image::Sha256FileNameGenerator;

/// Disk cache deleting files older than `max_age` when they are next read.
///
/// The age of a file is measured from the last time this cache stored it. Files
/// found on disk from an earlier session are aged from their modification time.
pub struct LimitedAgeDiskCache {
    base: BaseDiskCache,
    max_age: Duration,
    loading_dates: Mutex<HashMap<PathBuf, SystemTime>>,
}

impl LimitedAgeDiskCache {
    /// Creates a cache in `cache_dir` expiring files after `max_age`.
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>, max_age: Duration) -> Self {
        Self::with_options(cache_dir, None, Arc::new(Sha256FileNameGenerator), max_age)
    }

    /// Creates a cache with a reserve directory and a custom file namer.
    #[must_use]
    pub fn with_options(
        cache_dir: impl Into<PathBuf>,
        reserve_dir: Option<PathBuf>,
        name_generator: Arc<dyn FileNameGenerator>,
        max_age: Duration,
    ) -> Self {
        Self {
            base: BaseDiskCache::new(cache_dir.into(), reserve_dir, name_generator),
            max_age,
            loading_dates: Mutex::new(HashMap::new()),
        }
    }

    async fn loading_date(&self, path: &Path) -> Option<SystemTime> {
        if let Some(date) = self.loading_dates.lock().get(path) {
            return Some(*date);
        }
        let modified = fs::metadata(path).await.ok()?.modified().ok()?;
        self.loading_dates
            .lock()
            .insert(path.to_path_buf(), modified);
        Some(modified)
    }

    async fn remember_usage(&self, path: &Path) {
        let now = SystemTime::now();
        let file = path.to_path_buf();
        let touched = tokio::task::spawn_blocking(move || {
            filetime::set_file_mtime(file, FileTime::from_system_time(now))
        })
        .await
        .map_err(std::io::Error::other)
        .and_then(|result| result);
        if let Err(e) = touched {
            warn!(path = %path.display(), error = %e, "Failed to refresh cache file time");
        }
        self.loading_dates.lock().insert(path.to_path_buf(), now);
    }
}

#[async_trait::async_trait]
impl DiskCache for LimitedAgeDiskCache {
    fn directory(&self) -> PathBuf {
        self.base.directory()
    }

    async fn get(&self, uri: &str) -> Option<PathBuf> {
        let path = self.base.get(uri).await?;
        let loaded_at = self.loading_date(&path).await?;
        let age = SystemTime::now()
            .duration_since(loaded_at)
            .unwrap_or_default();
        if age > self.max_age {
            debug!(uri, age_secs = age.as_secs(), "Disk cache entry expired");
            if let Err(e) = fs::remove_file(&path).await {
                warn!(uri, error = %e, "Failed to delete expired cache file");
            }
            self.loading_dates.lock().remove(&path);
            return None;
        }
        Some(path)
    }

    async fn save(
        &self,
        uri: &str,
        stream: ImageStream,
        listener: &mut dyn CopyListener,
    ) -> bool {
        let Some(path) = self.base.save(uri, stream, listener).await else {
            return false;
        };
        self.remember_usage(&path).await;
        true
    }

    async fn save_image(&self, uri: &str, image: &DynamicImage) -> bool {
        let Some(path) = self.base.save_image(uri, image).await else {
            return false;
        };
        self.remember_usage(&path).await;
        true
    }

    async fn remove(&self, uri: &str) -> bool {
        if let Some(path) = self.base.file_for(uri) {
            self.loading_dates.lock().remove(&path);
        }
        self.base.remove(uri).await
    }

    async fn clear(&self) {
        self.base.clear().await;
        self.loading_dates.lock().clear();
    }

    async fn close(&self) {
        self.base.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::TempDir;

    async fn store(cache: &LimitedAgeDiskCache, uri: &str) {
        let mut listener = |_: u64, _: u64| true;
        assert!(
            cache
                .save(uri, ImageStream::from_bytes(Bytes::from_static(b"data")), &mut listener)
                .await
        );
    }

    #[tokio::test]
    async fn test_fresh_entry_is_returned() {
        let temp = TempDir::new().unwrap();
        let cache = LimitedAgeDiskCache::new(temp.path(), Duration::from_secs(60));
        store(&cache, "u").await;

        assert!(cache.get("u").await.is_some());
    }

    #[tokio::test]
    async fn test_expired_entry_is_deleted_on_read() {
        let temp = TempDir::new().unwrap();
        let cache = LimitedAgeDiskCache::new(temp.path(), Duration::from_millis(50));
        store(&cache, "u").await;
        let path = cache.get("u").await.unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(cache.get("u").await.is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_files_from_earlier_session_age_by_mtime() {
        let temp = TempDir::new().unwrap();
        let writer = LimitedAgeDiskCache::new(temp.path(), Duration::from_secs(3600));
        store(&writer, "old").await;
        store(&writer, "new").await;
        let old_path = writer.get("old").await.unwrap();
        let two_hours_ago = FileTime::from_system_time(
            SystemTime::now() - Duration::from_secs(2 * 3600),
        );
        filetime::set_file_mtime(&old_path, two_hours_ago).unwrap();

        let reader = LimitedAgeDiskCache::new(temp.path(), Duration::from_secs(3600));

        assert!(reader.get("old").await.is_none());
        assert!(reader.get("new").await.is_some());
    }

    #[tokio::test]
    async fn test_save_refreshes_age() {
        let temp = TempDir::new().unwrap();
        let cache = LimitedAgeDiskCache::new(temp.path(), Duration::from_millis(200));
        store(&cache, "u").await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        store(&cache, "u").await;
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert!(cache.get("u").await.is_some());
    }
}
