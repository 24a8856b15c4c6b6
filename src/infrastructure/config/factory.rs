//! Builds the loader configuration from the application configuration.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::app_config::{AppConfig, DiskCacheKind, MemoryCacheKind};
use super::storage::ConfigError;
use crate::application::{DisplayImageOptions, ImageLoaderConfiguration};
use crate::domain::ports::{DiskCache, MemoryCache};
use crate::infrastructure::image::{
    BaseTransport, DefaultImageDecoder, FifoLimitedMemoryCache, LimitedAgeDiskCache,
    LruDiskCache, LruDiskCacheOptions, LruLimitedMemoryCache, Sha256FileNameGenerator,
    UnlimitedDiskCache, WeakMemoryCache,
};

/// Creates the memory cache selected by `config`.
#[must_use]
pub fn build_memory_cache(config: &AppConfig) -> Arc<dyn MemoryCache> {
    let max_bytes = config.memory_cache.max_bytes;
    match config.memory_cache.kind {
        MemoryCacheKind::Fifo => Arc::new(FifoLimitedMemoryCache::new(max_bytes)),
        MemoryCacheKind::Lru => Arc::new(LruLimitedMemoryCache::new(max_bytes)),
        MemoryCacheKind::Weak => Arc::new(WeakMemoryCache::new()),
    }
}

/// Creates the disk cache selected by `config`.
///
/// # Errors
/// Returns error if no cache directory is known or the LRU journal cannot be opened.
pub fn build_disk_cache(config: &AppConfig) -> Result<Arc<dyn DiskCache>, ConfigError> {
    let directory = config
        .effective_cache_dir()
        .ok_or(ConfigError::CacheDirNotFound)?;
    let reserve = config.disk_cache.reserve_directory.clone();
    let naming = Arc::new(Sha256FileNameGenerator);

    let cache: Arc<dyn DiskCache> = match config.disk_cache.kind {
        DiskCacheKind::Lru => {
            let mut options = LruDiskCacheOptions::new(&directory)
                .with_max_size(config.disk_cache.max_size_bytes)
                .with_max_file_count(config.disk_cache.max_file_count)
                .with_name_generator(naming);
            if let Some(reserve) = reserve {
                options = options.with_reserve_dir(reserve);
            }
            Arc::new(LruDiskCache::open(options)?)
        }
        DiskCacheKind::Unlimited => {
            Arc::new(UnlimitedDiskCache::with_options(&directory, reserve, naming))
        }
        DiskCacheKind::LimitedAge => Arc::new(LimitedAgeDiskCache::with_options(
            &directory,
            reserve,
            naming,
            Duration::from_secs(config.disk_cache.max_age_secs),
        )),
    };
    info!(
        kind = ?config.disk_cache.kind,
        directory = %cache.directory().display(),
        "Disk cache ready"
    );
    Ok(cache)
}

/// Creates a complete loader configuration from `config`.
///
/// # Errors
/// Returns error if the disk cache or the HTTP client cannot be created.
pub fn build_configuration(config: &AppConfig) -> Result<ImageLoaderConfiguration, ConfigError> {
    let transport = Arc::new(BaseTransport::new(
        config.network.connect_timeout(),
        config.network.read_timeout(),
    )?);
    let defaults = DisplayImageOptions::new()
        .with_cache_in_memory(config.engine.cache_in_memory)
        .with_cache_on_disk(config.engine.cache_on_disk);

    Ok(ImageLoaderConfiguration::new(
        build_memory_cache(config),
        build_disk_cache(config)?,
        transport,
        Arc::new(DefaultImageDecoder::default()),
    )
    .with_thread_pool_size(config.engine.thread_pool_size)
    .with_max_image_size_for_memory_cache(config.engine.max_image_size_for_memory_cache)
    .with_max_image_size_for_disk_cache(config.engine.max_image_size_for_disk_cache)
    .with_default_display_options(defaults))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use test_case::test_case;

    #[test_case(DiskCacheKind::Lru ; "lru")]
    #[test_case(DiskCacheKind::Unlimited ; "unlimited")]
    #[test_case(DiskCacheKind::LimitedAge ; "limited age")]
    fn test_disk_cache_uses_configured_directory(kind: DiskCacheKind) {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.disk_cache.kind = kind;
        config.disk_cache.directory = Some(dir.path().join("images"));

        let cache = build_disk_cache(&config).unwrap();

        assert_eq!(cache.directory(), dir.path().join("images"));
    }

    #[test]
    fn test_memory_cache_kind() {
        let mut config = AppConfig::default();
        config.memory_cache.kind = MemoryCacheKind::Weak;
        let cache = build_memory_cache(&config);

        let image = Arc::new(image::DynamicImage::new_rgba8(4, 4));
        assert!(cache.put("k", Arc::clone(&image)));
        drop(image);
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_build_configuration_applies_engine_settings() {
        let dir = tempdir().unwrap();
        let mut config = AppConfig::default();
        config.disk_cache.directory = Some(dir.path().to_path_buf());
        config.engine.thread_pool_size = 6;
        config.engine.cache_on_disk = false;

        let loader_config = build_configuration(&config).unwrap();

        assert_eq!(loader_config.thread_pool_size(), 6);
        assert!(loader_config.default_display_options().cache_in_memory);
        assert!(!loader_config.default_display_options().cache_on_disk);
    }
}
