//! Public entry point: request intake, memory fast path and lifecycle.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tracing::{debug, info};

use super::display_task::{ProcessAndDisplayTask, report_delivery};
use super::engine::ImageLoaderEngine;
use super::image_aware::NonViewAware;
use super::load_task::ImageLoadingInfo;
use crate::application::configuration::ImageLoaderConfiguration;
use crate::application::dto::{DisplayImageOptions, DisplayRequest, LoadRequest};
use crate::domain::entities::{
    CacheKey, ImageSize, ImageSource, LoadedImage, TargetId, ViewScaleType,
};
use crate::domain::errors::{FailReason, LoaderError};
use crate::domain::ports::{
    DiskCache, ImageAware, ImageLoadingListener, MemoryCache, NoopLoadingListener,
};

/// Loads images into display targets through the memory cache, the disk cache and the network.
///
/// Must be initialized with [`ImageLoader::init`] before use.
pub struct ImageLoader {
    engine: RwLock<Option<Arc<ImageLoaderEngine>>>,
    default_listener: Arc<dyn ImageLoadingListener>,
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageLoader {
    /// Creates an uninitialized loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            engine: RwLock::new(None),
            default_listener: Arc::new(NoopLoadingListener),
        }
    }

    /// Starts the loader with `config`.
    ///
    /// # Errors
    /// Returns error if already initialized or if no tokio runtime is available.
    pub fn init(&self, config: ImageLoaderConfiguration) -> Result<(), LoaderError> {
        let mut engine = self.engine.write();
        if engine.is_some() {
            return Err(LoaderError::AlreadyInitialized);
        }
        debug!(config = ?config, "Initializing image loader");
        *engine = Some(ImageLoaderEngine::new(config)?);
        info!("Image loader initialized");
        Ok(())
    }

    /// Returns true once initialized and until destroyed.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.engine.read().is_some()
    }

    fn engine(&self) -> Result<Arc<ImageLoaderEngine>, LoaderError> {
        self.engine
            .read()
            .as_ref()
            .map(Arc::clone)
            .ok_or(LoaderError::NotInitialized)
    }

    /// Loads `uri` and shows it on `target`.
    ///
    /// Listener callbacks fire on the request's callback executor, or on the loader's
    /// completion dispatcher. A memory cache hit without post-processing is shown
    /// and reported on the calling thread before this returns.
    ///
    /// # Errors
    /// Returns error if the loader is not initialized.
    pub fn display_image(
        &self,
        uri: &str,
        target: Arc<dyn ImageAware>,
        request: DisplayRequest,
    ) -> Result<(), LoaderError> {
        let engine = self.engine()?;
        let config = engine.configuration();
        let listener = request
            .listener
            .unwrap_or_else(|| Arc::clone(&self.default_listener));
        let options = request
            .options
            .unwrap_or_else(|| config.default_display_options.clone());

        if uri.is_empty() {
            engine.cancel_display_task_for(target.id());
            listener.on_loading_started(uri);
            target.set_image(options.image_for_empty_uri.clone());
            listener.on_loading_complete(uri, None);
            return Ok(());
        }

        let target_size = target
            .size()
            .or_max(config.max_image_size_for_memory_cache);
        let key = CacheKey::new(uri, target_size);
        engine.prepare_display_task_for(target.id(), key.clone());
        listener.on_loading_started(uri);

        let info = ImageLoadingInfo {
            uri: uri.to_string(),
            key: key.clone(),
            target: Arc::clone(&target),
            target_size,
            options,
            listener: Arc::clone(&listener),
            progress_listener: request.progress_listener,
        };

        if let Some(image) = config.memory_cache.get(key.as_str()) {
            debug!(key = %key, "Loading image from memory cache");
            if info.options.post_processor.is_some() {
                engine.submit_process(ProcessAndDisplayTask::new(
                    Arc::clone(&engine),
                    info,
                    image,
                ));
            } else {
                let delivery = engine.deliver_if_current(target.id(), &key, || {
                    info.options
                        .displayer
                        .display(Arc::clone(&image), target.as_ref(), ImageSource::MemoryCache);
                });
                report_delivery(&info, delivery, image, ImageSource::MemoryCache);
            }
            return Ok(());
        }

        if let Some(placeholder) = &info.options.image_on_loading {
            target.set_image(Some(Arc::clone(placeholder)));
        } else if info.options.reset_view_before_loading {
            target.set_image(None);
        }
        engine.submit(info);
        Ok(())
    }

    /// Loads `uri` without a display target; the result arrives through the listener.
    ///
    /// # Errors
    /// Returns error if the loader is not initialized.
    pub fn load_image(&self, uri: &str, request: LoadRequest) -> Result<(), LoaderError> {
        let engine = self.engine()?;
        let size = request
            .target_size
            .unwrap_or(engine.configuration().max_image_size_for_memory_cache);
        let target = Arc::new(NonViewAware::new(size, ViewScaleType::Crop));
        self.display_image(uri, target, request.request)
    }

    /// Loads `uri` and resolves to the image. `Ok(None)` means the URI was empty.
    ///
    /// Callbacks of the request run inline on the load task.
    ///
    /// # Errors
    /// Returns [`LoaderError::Failed`] if loading failed and [`LoaderError::Cancelled`]
    /// if the engine was stopped first.
    pub async fn load(
        &self,
        uri: &str,
        target_size: Option<ImageSize>,
        options: Option<DisplayImageOptions>,
    ) -> Result<Option<LoadedImage>, LoaderError> {
        let options = match options {
            Some(options) => options,
            None => self.engine()?.configuration().default_display_options.clone(),
        }
        .with_sync_loading(true);

        let (tx, rx) = oneshot::channel();
        let listener = Arc::new(OneshotListener {
            tx: Mutex::new(Some(tx)),
        });
        let mut request = LoadRequest::new().with_options(options).with_listener(listener);
        request.target_size = target_size;
        self.load_image(uri, request)?;

        match rx.await {
            Ok(LoadOutcome::Complete(image)) => Ok(image),
            Ok(LoadOutcome::Failed(reason)) => Err(LoaderError::Failed(reason)),
            Ok(LoadOutcome::Cancelled) | Err(_) => Err(LoaderError::Cancelled),
        }
    }

    /// Stops delivery to `target`. A running load for it ends as cancelled.
    ///
    /// # Errors
    /// Returns error if the loader is not initialized.
    pub fn cancel_display_task(&self, target: &dyn ImageAware) -> Result<(), LoaderError> {
        self.engine()?.cancel_display_task_for(target.id());
        Ok(())
    }

    /// Key of the request `target` is waiting for.
    ///
    /// # Errors
    /// Returns error if the loader is not initialized.
    pub fn loading_key_for(&self, target: TargetId) -> Result<Option<CacheKey>, LoaderError> {
        Ok(self.engine()?.loading_key_for(target))
    }

    /// Holds queued tasks before they start loading.
    ///
    /// # Errors
    /// Returns error if the loader is not initialized.
    pub fn pause(&self) -> Result<(), LoaderError> {
        self.engine()?.pause();
        Ok(())
    }

    /// Releases paused tasks.
    ///
    /// # Errors
    /// Returns error if the loader is not initialized.
    pub fn resume(&self) -> Result<(), LoaderError> {
        self.engine()?.resume();
        Ok(())
    }

    /// Cancels every running task. Later requests start a fresh set of workers.
    ///
    /// # Errors
    /// Returns error if the loader is not initialized.
    pub fn stop(&self) -> Result<(), LoaderError> {
        self.engine()?.stop();
        Ok(())
    }

    /// Fails network loads with `NetworkDenied` while set. Disk cache hits still load.
    ///
    /// # Errors
    /// Returns error if the loader is not initialized.
    pub fn deny_network_downloads(&self, deny: bool) -> Result<(), LoaderError> {
        self.engine()?.deny_network_downloads(deny);
        Ok(())
    }

    /// Buffers whole network bodies before decoding while set.
    ///
    /// # Errors
    /// Returns error if the loader is not initialized.
    pub fn handle_slow_network(&self, slow: bool) -> Result<(), LoaderError> {
        self.engine()?.handle_slow_network(slow);
        Ok(())
    }

    /// Returns the memory cache.
    ///
    /// # Errors
    /// Returns error if the loader is not initialized.
    pub fn memory_cache(&self) -> Result<Arc<dyn MemoryCache>, LoaderError> {
        Ok(Arc::clone(&self.engine()?.configuration().memory_cache))
    }

    /// Returns the disk cache.
    ///
    /// # Errors
    /// Returns error if the loader is not initialized.
    pub fn disk_cache(&self) -> Result<Arc<dyn DiskCache>, LoaderError> {
        Ok(Arc::clone(&self.engine()?.configuration().disk_cache))
    }

    /// Empties the memory cache.
    ///
    /// # Errors
    /// Returns error if the loader is not initialized.
    pub fn clear_memory_cache(&self) -> Result<(), LoaderError> {
        self.engine()?.configuration().memory_cache.clear();
        Ok(())
    }

    /// Empties the disk cache.
    ///
    /// # Errors
    /// Returns error if the loader is not initialized.
    pub async fn clear_disk_cache(&self) -> Result<(), LoaderError> {
        let disk_cache = self.disk_cache()?;
        disk_cache.clear().await;
        Ok(())
    }

    /// Stops the engine, closes the disk cache and returns to the uninitialized state.
    pub async fn destroy(&self) {
        let engine = self.engine.write().take();
        if let Some(engine) = engine {
            engine.stop();
            engine.configuration().disk_cache.close().await;
            info!("Image loader destroyed");
        }
    }
}

impl std::fmt::Debug for ImageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoader")
            .field("engine", &*self.engine.read())
            .finish_non_exhaustive()
    }
}

enum LoadOutcome {
    Complete(Option<LoadedImage>),
    Failed(FailReason),
    Cancelled,
}

/// Turns the listener protocol into a single outcome.
struct OneshotListener {
    tx: Mutex<Option<oneshot::Sender<LoadOutcome>>>,
}

impl OneshotListener {
    fn finish(&self, outcome: LoadOutcome) {
        if let Some(tx) = self.tx.lock().take() {
            let _ = tx.send(outcome);
        }
    }
}

impl ImageLoadingListener for OneshotListener {
    fn on_loading_failed(&self, _uri: &str, reason: &FailReason) {
        self.finish(LoadOutcome::Failed(reason.clone()));
    }

    fn on_loading_complete(&self, _uri: &str, image: Option<&LoadedImage>) {
        self.finish(LoadOutcome::Complete(image.cloned()));
    }

    fn on_loading_cancelled(&self, _uri: &str) {
        self.finish(LoadOutcome::Cancelled);
    }
}
