//! Runtime configuration of the image loader.

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::application::dto::DisplayImageOptions;
use crate::domain::entities::ImageSize;
use crate::domain::ports::{DiskCache, ImageDecoder, ImageProcessor, MemoryCache, Transport};
use crate::infrastructure::image::{NetworkDeniedTransport, SlowNetworkTransport};

/// Default number of concurrent loads per pool.
pub const DEFAULT_THREAD_POOL_SIZE: usize = 3;

/// Collaborators and limits shared by every load task.
#[derive(Clone)]
pub struct ImageLoaderConfiguration {
    pub(crate) memory_cache: Arc<dyn MemoryCache>,
    pub(crate) disk_cache: Arc<dyn DiskCache>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) network_denied_transport: Arc<dyn Transport>,
    pub(crate) slow_network_transport: Arc<dyn Transport>,
    pub(crate) decoder: Arc<dyn ImageDecoder>,
    pub(crate) thread_pool_size: usize,
    pub(crate) max_image_size_for_memory_cache: ImageSize,
    pub(crate) max_image_size_for_disk_cache: ImageSize,
    pub(crate) processor_for_disk_cache: Option<Arc<dyn ImageProcessor>>,
    pub(crate) default_display_options: DisplayImageOptions,
    pub(crate) runtime: Option<Handle>,
}

impl ImageLoaderConfiguration {
    /// Creates a configuration from the four required collaborators.
    ///
    /// The memory cache size limit defaults to 1920x1080 so targets that are not
    /// laid out yet still decode to a bounded size.
    #[must_use]
    pub fn new(
        memory_cache: Arc<dyn MemoryCache>,
        disk_cache: Arc<dyn DiskCache>,
        transport: Arc<dyn Transport>,
        decoder: Arc<dyn ImageDecoder>,
    ) -> Self {
        Self {
            memory_cache,
            disk_cache,
            network_denied_transport: Arc::new(NetworkDeniedTransport::new(Arc::clone(
                &transport,
            ))),
            slow_network_transport: Arc::new(SlowNetworkTransport::new(Arc::clone(&transport))),
            transport,
            decoder,
            thread_pool_size: DEFAULT_THREAD_POOL_SIZE,
            max_image_size_for_memory_cache: ImageSize::new(1920, 1080),
            max_image_size_for_disk_cache: ImageSize::default(),
            processor_for_disk_cache: None,
            default_display_options: DisplayImageOptions::default(),
            runtime: None,
        }
    }

    /// Sets the number of concurrent loads per pool. Zero is raised to one.
    #[must_use]
    pub fn with_thread_pool_size(mut self, size: usize) -> Self {
        self.thread_pool_size = size.max(1);
        self
    }

    /// Sets the decode size used when a target reports no size.
    #[must_use]
    pub const fn with_max_image_size_for_memory_cache(mut self, size: ImageSize) -> Self {
        self.max_image_size_for_memory_cache = size;
        self
    }

    /// Resizes downloaded files to fit `size` before they stay on disk.
    /// A zero dimension leaves that dimension unbounded.
    #[must_use]
    pub const fn with_max_image_size_for_disk_cache(mut self, size: ImageSize) -> Self {
        self.max_image_size_for_disk_cache = size;
        self
    }

    /// Runs `processor` on resized images before they are written back to disk.
    #[must_use]
    pub fn with_processor_for_disk_cache(mut self, processor: Arc<dyn ImageProcessor>) -> Self {
        self.processor_for_disk_cache = Some(processor);
        self
    }

    /// Options used by requests that do not bring their own.
    #[must_use]
    pub fn with_default_display_options(mut self, options: DisplayImageOptions) -> Self {
        self.default_display_options = options;
        self
    }

    /// Runs load tasks on `handle` instead of the runtime current at init time.
    #[must_use]
    pub fn with_runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Returns the memory cache.
    #[must_use]
    pub fn memory_cache(&self) -> &Arc<dyn MemoryCache> {
        &self.memory_cache
    }

    /// Returns the disk cache.
    #[must_use]
    pub fn disk_cache(&self) -> &Arc<dyn DiskCache> {
        &self.disk_cache
    }

    /// Returns the pool size.
    #[must_use]
    pub const fn thread_pool_size(&self) -> usize {
        self.thread_pool_size
    }

    /// Returns the default display options.
    #[must_use]
    pub const fn default_display_options(&self) -> &DisplayImageOptions {
        &self.default_display_options
    }

    /// Disk resize is enabled when either dimension is bounded.
    pub(crate) const fn resizes_for_disk_cache(&self) -> bool {
        self.max_image_size_for_disk_cache.width > 0
            || self.max_image_size_for_disk_cache.height > 0
    }
}

impl std::fmt::Debug for ImageLoaderConfiguration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoaderConfiguration")
            .field("disk_cache", &self.disk_cache.directory())
            .field("thread_pool_size", &self.thread_pool_size)
            .field(
                "max_image_size_for_memory_cache",
                &self.max_image_size_for_memory_cache,
            )
            .field(
                "max_image_size_for_disk_cache",
                &self.max_image_size_for_disk_cache,
            )
            .field("default_display_options", &self.default_display_options)
            .finish_non_exhaustive()
    }
}
