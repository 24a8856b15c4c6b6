//! File-per-URI cache without eviction.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use image::DynamicImage;
use tokio::fs;
use tracing::{debug, trace, warn};

use super::{
    DEFAULT_BUFFER_SIZE, encode_png, persist_temp, resolve_directory, write_temp_bytes,
    write_temp_file,
};
use crate::domain::ports::{CopyListener, DiskCache, FileNameGenerator, ImageStream};
use crate::infrastructure::image::Sha256FileNameGenerator;

/// Shared storage logic of the file-per-URI caches.
pub(super) struct BaseDiskCache {
    cache_dir: PathBuf,
    // Resolved once at construction; `None` disables the cache.
    active_dir: Option<PathBuf>,
    name_generator: Arc<dyn FileNameGenerator>,
    buffer_size: usize,
    closed: AtomicBool,
}

impl BaseDiskCache {
    pub(super) fn new(
        cache_dir: PathBuf,
        reserve_dir: Option<PathBuf>,
        name_generator: Arc<dyn FileNameGenerator>,
    ) -> Self {
        let active_dir = resolve_directory(&cache_dir, reserve_dir.as_deref());
        if active_dir.is_none() {
            warn!(dir = %cache_dir.display(), "Disk cache disabled, no usable directory");
        }
        Self {
            cache_dir,
            active_dir,
            name_generator,
            buffer_size: DEFAULT_BUFFER_SIZE,
            closed: AtomicBool::new(false),
        }
    }

    /// Directory files are stored in: the primary one, or the reserve if the
    /// primary could not be created.
    pub(super) fn directory(&self) -> PathBuf {
        self.active_dir
            .clone()
            .unwrap_or_else(|| self.cache_dir.clone())
    }

    /// Path the file for `uri` has, or would have.
    pub(super) fn file_for(&self, uri: &str) -> Option<PathBuf> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        let name = self.name_generator.generate(uri);
        self.active_dir.as_ref().map(|dir| dir.join(name))
    }

    pub(super) async fn get(&self, uri: &str) -> Option<PathBuf> {
        let path = self.file_for(uri)?;
        if fs::try_exists(&path).await.unwrap_or(false) {
            trace!(uri, path = %path.display(), "Disk cache hit");
            Some(path)
        } else {
            trace!(uri, "Disk cache miss");
            None
        }
    }

    pub(super) async fn save(
        &self,
        uri: &str,
        stream: ImageStream,
        listener: &mut dyn CopyListener,
    ) -> Option<PathBuf> {
        let target = self.file_for(uri)?;
        let dir = target.parent()?.to_path_buf();
        let name = self.name_generator.generate(uri);

        match write_temp_file(&dir, &name, stream, listener, self.buffer_size).await {
            Ok(Some((temp, len))) => Self::persist(uri, temp, target, len).await,
            Ok(None) => {
                debug!(uri, "Disk cache write stopped by listener");
                None
            }
            Err(e) => {
                warn!(uri, error = %e, "Failed to write image to disk cache");
                None
            }
        }
    }

    pub(super) async fn save_image(&self, uri: &str, image: &DynamicImage) -> Option<PathBuf> {
        let target = self.file_for(uri)?;
        let dir = target.parent()?.to_path_buf();
        let name = self.name_generator.generate(uri);

        let bytes = match encode_png(image).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(uri, error = %e, "Failed to encode image for disk cache");
                return None;
            }
        };
        match write_temp_bytes(&dir, &name, bytes).await {
            Ok((temp, len)) => Self::persist(uri, temp, target, len).await,
            Err(e) => {
                warn!(uri, error = %e, "Failed to write image to disk cache");
                None
            }
        }
    }

    async fn persist(
        uri: &str,
        temp: tempfile::TempPath,
        target: PathBuf,
        len: u64,
    ) -> Option<PathBuf> {
        match persist_temp(temp, target.clone()).await {
            Ok(()) => {
                debug!(uri, path = %target.display(), size = len, "Stored image in disk cache");
                Some(target)
            }
            Err(e) => {
                warn!(uri, error = %e, "Failed to move image into disk cache");
                None
            }
        }
    }

    pub(super) async fn remove(&self, uri: &str) -> bool {
        let Some(path) = self.file_for(uri) else {
            return false;
        };
        match fs::remove_file(&path).await {
            Ok(()) => true,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(uri, error = %e, "Failed to remove from disk cache");
                }
                false
            }
        }
    }

    pub(super) async fn clear(&self) {
        let Some(dir) = &self.active_dir else {
            return;
        };
        let Ok(mut entries) = fs::read_dir(dir).await else {
            warn!(dir = %dir.display(), "Failed to read cache dir");
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let is_file = entry.file_type().await.is_ok_and(|kind| kind.is_file());
            let path = entry.path();
            if is_file && fs::remove_file(&path).await.is_err() {
                warn!(path = %path.display(), "Failed to remove cache file");
            }
        }
        debug!(dir = %dir.display(), "Cleared disk cache");
    }

    pub(super) fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Disk cache that never evicts.
pub struct UnlimitedDiskCache {
    base: BaseDiskCache,
}

impl UnlimitedDiskCache {
    /// Creates a cache in `cache_dir`, named with [`Sha256FileNameGenerator`].
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self::with_options(cache_dir, None, Arc::new(Sha256FileNameGenerator))
    }

    /// Creates a cache with a reserve directory and a custom file namer.
    #[must_use]
    pub fn with_options(
        cache_dir: impl Into<PathBuf>,
        reserve_dir: Option<PathBuf>,
        name_generator: Arc<dyn FileNameGenerator>,
    ) -> Self {
        Self {
            base: BaseDiskCache::new(cache_dir.into(), reserve_dir, name_generator),
        }
    }
}

#[async_trait::async_trait]
impl DiskCache for UnlimitedDiskCache {
    fn directory(&self) -> PathBuf {
        self.base.directory()
    }

    async fn get(&self, uri: &str) -> Option<PathBuf> {
        self.base.get(uri).await
    }

    async fn save(
        &self,
        uri: &str,
        stream: ImageStream,
        listener: &mut dyn CopyListener,
    ) -> bool {
        self.base.save(uri, stream, listener).await.is_some()
    }

    async fn save_image(&self, uri: &str, image: &DynamicImage) -> bool {
        self.base.save_image(uri, image).await.is_some()
    }

    async fn remove(&self, uri: &str) -> bool {
        self.base.remove(uri).await
    }

    async fn clear(&self) {
        self.base.clear().await;
    }

    async fn close(&self) {
        self.base.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::mocks::{FailingReader, png_bytes};
    use bytes::Bytes;
    use tempfile::TempDir;

    fn create_test_cache() -> (UnlimitedDiskCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = UnlimitedDiskCache::new(temp_dir.path().join("images"));
        (cache, temp_dir)
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let (cache, _temp) = create_test_cache();
        let data = b"test image data".to_vec();
        let mut listener = |_: u64, _: u64| true;

        let saved = cache
            .save(
                "http://x/a.png",
                ImageStream::from_bytes(Bytes::from(data.clone())),
                &mut listener,
            )
            .await;
        assert!(saved);

        let path = cache.get("http://x/a.png").await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), data);
        assert!(cache.get("http://x/b.png").await.is_none());
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_file() {
        let (cache, _temp) = create_test_cache();
        let mut listener = |_: u64, _: u64| true;
        let stream = ImageStream::new(FailingReader::new(vec![1, 2, 3]), Some(100));

        assert!(!cache.save("http://x/a.png", stream, &mut listener).await);

        assert!(cache.get("http://x/a.png").await.is_none());
        let leftovers = std::fs::read_dir(cache.directory()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn test_failed_rewrite_keeps_previous_file() {
        let (cache, _temp) = create_test_cache();
        let mut listener = |_: u64, _: u64| true;
        cache
            .save(
                "u",
                ImageStream::from_bytes(Bytes::from_static(b"first")),
                &mut listener,
            )
            .await;

        let stream = ImageStream::new(FailingReader::new(vec![9; 4]), None);
        assert!(!cache.save("u", stream, &mut listener).await);

        let path = cache.get("u").await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_save_image_writes_png() {
        let (cache, _temp) = create_test_cache();
        let image = image::load_from_memory(&png_bytes(6, 4)).unwrap();

        assert!(cache.save_image("u", &image).await);

        let path = cache.get("u").await.unwrap();
        let reloaded = image::load_from_memory(&std::fs::read(path).unwrap()).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (6, 4));
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let (cache, _temp) = create_test_cache();
        let mut listener = |_: u64, _: u64| true;
        for uri in ["a", "b"] {
            cache
                .save(uri, ImageStream::from_bytes(Bytes::from_static(b"x")), &mut listener)
                .await;
        }

        assert!(cache.remove("a").await);
        assert!(!cache.remove("a").await);

        cache.clear().await;
        assert!(cache.get("b").await.is_none());
    }

    #[tokio::test]
    async fn test_closed_cache_misses() {
        let (cache, _temp) = create_test_cache();
        let mut listener = |_: u64, _: u64| true;
        cache
            .save("a", ImageStream::from_bytes(Bytes::from_static(b"x")), &mut listener)
            .await;

        cache.close().await;

        assert!(cache.get("a").await.is_none());
    }

    #[tokio::test]
    async fn test_directory_resolved_once_at_construction() {
        let temp = TempDir::new().unwrap();
        let blocker = temp.path().join("blocker");
        std::fs::write(&blocker, b"file").unwrap();
        let reserve = temp.path().join("reserve");

        let cache = UnlimitedDiskCache::with_options(
            blocker.join("images"),
            Some(reserve.clone()),
            Arc::new(Sha256FileNameGenerator),
        );
        assert_eq!(cache.directory(), reserve);

        // A primary directory that becomes usable later is not picked up.
        std::fs::remove_file(&blocker).unwrap();
        std::fs::create_dir_all(blocker.join("images")).unwrap();

        let mut listener = |_: u64, _: u64| true;
        assert!(
            cache
                .save("a", ImageStream::from_bytes(Bytes::from_static(b"x")), &mut listener)
                .await
        );
        assert_eq!(cache.directory(), reserve);
        assert!(cache.get("a").await.unwrap().starts_with(&reserve));
        assert_eq!(std::fs::read_dir(blocker.join("images")).unwrap().count(), 0);
    }
}
