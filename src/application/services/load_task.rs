//! The load-and-display task: pause gate, delay, per-URI lock, resolve, cache, dispatch.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use image::DynamicImage;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::dispatcher::panic_message;
use super::display_task::{DisplayImageTask, process_image};
use super::engine::{Delivery, ImageLoaderEngine};
use crate::application::dto::DisplayImageOptions;
use crate::domain::entities::{
    CacheKey, ImageScaleType, ImageSize, ImageSource, Scheme, ViewScaleType,
};
use crate::domain::errors::{FailReason, FailType, LoadError};
use crate::domain::ports::{
    CopyListener, DecodingInfo, ImageAware, ImageLoadingListener, ProgressListener,
};

/// Everything a task needs to know about its request.
pub(crate) struct ImageLoadingInfo {
    pub(crate) uri: String,
    pub(crate) key: CacheKey,
    pub(crate) target: Arc<dyn ImageAware>,
    pub(crate) target_size: ImageSize,
    pub(crate) options: DisplayImageOptions,
    pub(crate) listener: Arc<dyn ImageLoadingListener>,
    pub(crate) progress_listener: Option<Arc<dyn ProgressListener>>,
}

enum TaskError {
    Cancelled,
    Failed(FailReason),
}

impl From<LoadError> for TaskError {
    fn from(error: LoadError) -> Self {
        Self::Failed(FailReason::from(error))
    }
}

type Resolved = (DynamicImage, ImageSource);

pub(crate) struct LoadAndDisplayTask {
    engine: Arc<ImageLoaderEngine>,
    info: Arc<ImageLoadingInfo>,
    interrupt: CancellationToken,
}

impl LoadAndDisplayTask {
    pub(crate) fn new(
        engine: Arc<ImageLoaderEngine>,
        info: ImageLoadingInfo,
        interrupt: CancellationToken,
    ) -> Self {
        Self {
            engine,
            info: Arc::new(info),
            interrupt,
        }
    }

    pub(crate) fn uri(&self) -> &str {
        &self.info.uri
    }

    pub(crate) fn key(&self) -> &CacheKey {
        &self.info.key
    }

    pub(crate) async fn run(self) {
        match self.load().await {
            Ok((image, source)) => {
                DisplayImageTask::new(Arc::clone(&self.engine), self.info, image, source).post();
            }
            Err(TaskError::Cancelled) => self.fire_cancelled(),
            Err(TaskError::Failed(reason)) => self.fire_failed(reason),
        }
    }

    async fn load(&self) -> Result<(Arc<DynamicImage>, ImageSource), TaskError> {
        self.wait_if_paused().await?;
        self.delay_if_needed().await?;

        let key = self.key();
        debug!(key = %key, "Starting load task");
        if self.engine.locks().is_locked(self.uri()) {
            debug!(key = %key, "Image is already being loaded, waiting");
        }
        let _uri_lock = self.interruptible(self.engine.locks().acquire(self.uri())).await?;

        self.check_actual()?;
        let config = self.engine.configuration();
        let (image, source) = if let Some(image) = config.memory_cache.get(key.as_str()) {
            debug!(key = %key, "Got image from memory cache after waiting");
            (image, ImageSource::MemoryCache)
        } else {
            let (image, source) = self.interruptible(self.resolve_guarded()).await??;
            self.check_actual()?;
            self.check_interrupted()?;

            let mut image = Arc::new(image);
            if let Some(processor) = &self.info.options.pre_processor {
                image = process_image(processor.as_ref(), image, key, "pre-processor");
            }
            if self.info.options.cache_in_memory {
                debug!(key = %key, "Caching image in memory");
                config.memory_cache.put(key.as_str(), Arc::clone(&image));
            }
            (image, source)
        };

        let image = match &self.info.options.post_processor {
            Some(processor) => process_image(processor.as_ref(), image, key, "post-processor"),
            None => image,
        };
        self.check_actual()?;
        self.check_interrupted()?;
        Ok((image, source))
    }

    async fn wait_if_paused(&self) -> Result<(), TaskError> {
        if self.engine.is_paused() {
            self.check_actual()?;
            debug!(key = %self.key(), "Engine is paused, waiting for resume");
            self.interruptible(self.engine.wait_until_resumed()).await?;
            debug!(key = %self.key(), "Resumed after pause");
        }
        self.check_actual()
    }

    async fn delay_if_needed(&self) -> Result<(), TaskError> {
        let delay = self.info.options.delay_before_loading;
        if delay.is_zero() {
            return Ok(());
        }
        debug!(key = %self.key(), delay_ms = delay.as_millis(), "Delaying before loading");
        self.interruptible(tokio::time::sleep(delay)).await?;
        self.check_actual()
    }

    /// Catches panics from the decoder, transport or caches and reports them as `Unknown`.
    async fn resolve_guarded(&self) -> Result<Resolved, TaskError> {
        match AssertUnwindSafe(self.resolve()).catch_unwind().await {
            Ok(result) => result,
            Err(panic_info) => {
                let panic_msg = panic_message(&*panic_info);
                error!(key = %self.key(), panic = %panic_msg, "Image resolve panicked");
                Err(LoadError::unexpected(format!("resolve panicked: {panic_msg}")).into())
            }
        }
    }

    async fn resolve(&self) -> Result<Resolved, TaskError> {
        let config = self.engine.configuration();
        let key = self.key();

        if let Some(path) = config.disk_cache.get(self.uri()).await
            && tokio::fs::metadata(&path)
                .await
                .is_ok_and(|meta| meta.len() > 0)
        {
            debug!(key = %key, "Loading image from disk cache");
            self.check_actual()?;
            match self.decode(&Scheme::File.wrap_path(&path)).await {
                Ok(Some(image)) if !is_blank(&image) => return Ok((image, ImageSource::DiskCache)),
                Ok(_) => debug!(key = %key, "Cached file decoded to nothing"),
                Err(e) => warn!(key = %key, error = %e, "Failed to decode cached file"),
            }
        }

        debug!(key = %key, "Loading image from network");
        let mut uri_for_decoding = self.uri().to_string();
        if self.info.options.cache_on_disk && self.try_cache_on_disk().await?
            && let Some(path) = config.disk_cache.get(self.uri()).await
        {
            uri_for_decoding = Scheme::File.wrap_path(&path);
        }

        self.check_actual()?;
        match self.decode(&uri_for_decoding).await? {
            Some(image) if !is_blank(&image) => Ok((image, ImageSource::Network)),
            _ => Err(TaskError::Failed(FailReason::new(FailType::DecodingError))),
        }
    }

    async fn decode(&self, image_uri: &str) -> Result<Option<DynamicImage>, LoadError> {
        let info = DecodingInfo {
            cache_key: self.key().clone(),
            image_uri: image_uri.to_string(),
            original_uri: self.uri().to_string(),
            target_size: self.info.target_size,
            view_scale_type: self.info.target.scale_type(),
            image_scale_type: self.info.options.image_scale_type,
            transport: self.engine.transport(),
            extra: self.info.options.extra_for_downloader.clone(),
        };
        self.engine.configuration().decoder.decode(&info).await
    }

    /// Downloads into the disk cache. Only a network refusal fails the task here;
    /// other errors fall through to decoding straight from the source.
    async fn try_cache_on_disk(&self) -> Result<bool, TaskError> {
        let key = self.key();
        debug!(key = %key, "Caching image on disk");
        let loaded = match self.download().await {
            Ok(loaded) => loaded,
            Err(e) if e.fail_type() == FailType::NetworkDenied => return Err(e.into()),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to cache image on disk");
                false
            }
        };
        if loaded && self.engine.configuration().resizes_for_disk_cache() {
            debug!(key = %key, "Resizing cached image file");
            if !self.resize_and_save().await {
                debug!(key = %key, "Cached image file kept at original size");
            }
        }
        Ok(loaded)
    }

    async fn download(&self) -> Result<bool, LoadError> {
        let transport = self.engine.transport();
        let Some(stream) = transport
            .open(self.uri(), self.info.options.extra_for_downloader.as_deref())
            .await?
        else {
            error!(key = %self.key(), "No stream for image");
            return Ok(false);
        };
        let mut listener = TaskCopyListener { task: self };
        Ok(self
            .engine
            .configuration()
            .disk_cache
            .save(self.uri(), stream, &mut listener)
            .await)
    }

    async fn resize_and_save(&self) -> bool {
        let config = self.engine.configuration();
        let Some(path) = config.disk_cache.get(self.uri()).await else {
            return false;
        };
        let max = config.max_image_size_for_disk_cache;
        let info = DecodingInfo {
            cache_key: self.key().clone(),
            image_uri: Scheme::File.wrap_path(&path),
            original_uri: self.uri().to_string(),
            target_size: max.or_max(ImageSize::new(u32::MAX, u32::MAX)),
            view_scale_type: ViewScaleType::FitInside,
            image_scale_type: ImageScaleType::Exactly,
            transport: self.engine.transport(),
            extra: None,
        };
        let image = match config.decoder.decode(&info).await {
            Ok(Some(image)) => Arc::new(image),
            Ok(None) => return false,
            Err(e) => {
                warn!(key = %self.key(), error = %e, "Failed to decode file for resize");
                return false;
            }
        };
        let image = match &config.processor_for_disk_cache {
            Some(processor) => {
                debug!(key = %self.key(), "Processing image before caching on disk");
                match processor.process(Arc::clone(&image)) {
                    Some(processed) => processed,
                    None => {
                        error!(key = %self.key(), "Disk cache processor returned nothing");
                        return false;
                    }
                }
            }
            None => image,
        };
        config.disk_cache.save_image(self.uri(), &image).await
    }

    async fn interruptible<F: Future>(&self, future: F) -> Result<F::Output, TaskError> {
        tokio::select! {
            biased;
            () = self.interrupt.cancelled() => {
                debug!(key = %self.key(), "Task interrupted");
                Err(TaskError::Cancelled)
            }
            output = future => Ok(output),
        }
    }

    fn is_interrupted(&self) -> bool {
        self.interrupt.is_cancelled()
    }

    fn check_interrupted(&self) -> Result<(), TaskError> {
        if self.is_interrupted() {
            debug!(key = %self.key(), "Task interrupted");
            return Err(TaskError::Cancelled);
        }
        Ok(())
    }

    /// A task is stale once its target is collected or bound to another request.
    fn is_stale(&self) -> bool {
        if self.info.target.is_collected() {
            debug!(key = %self.key(), "Target was collected, cancelling task");
            return true;
        }
        if !self.engine.is_current(self.info.target.id(), self.key()) {
            debug!(key = %self.key(), "Target was reused for another image, cancelling task");
            return true;
        }
        false
    }

    fn check_actual(&self) -> Result<(), TaskError> {
        if self.is_stale() {
            return Err(TaskError::Cancelled);
        }
        Ok(())
    }

    fn fire_progress(&self, current: u64, total: u64) -> bool {
        if self.is_interrupted() || self.is_stale() {
            return false;
        }
        if let Some(progress) = &self.info.progress_listener {
            let progress = Arc::clone(progress);
            let info = Arc::clone(&self.info);
            self.engine.fire_callback(
                &self.info.options,
                Box::new(move || progress.on_progress_update(&info.uri, current, total)),
            );
        }
        true
    }

    pub(crate) fn fire_cancelled(&self) {
        let info = Arc::clone(&self.info);
        self.engine.fire_callback(
            &self.info.options,
            Box::new(move || info.listener.on_loading_cancelled(&info.uri)),
        );
    }

    /// Shows the failure placeholder and reports the failure, unless the target moved on.
    fn fire_failed(&self, reason: FailReason) {
        if self.is_interrupted() || self.is_stale() {
            self.fire_cancelled();
            return;
        }
        warn!(key = %self.key(), reason = %reason, "Image load failed");
        let info = Arc::clone(&self.info);
        let engine = Arc::clone(&self.engine);
        self.engine.fire_callback(
            &self.info.options,
            Box::new(move || {
                let target = &info.target;
                let delivery = if target.is_collected() {
                    Delivery::Stale
                } else {
                    engine.deliver_if_current(target.id(), &info.key, || {
                        if let Some(image) = &info.options.image_on_fail {
                            target.set_image(Some(Arc::clone(image)));
                        }
                    })
                };
                match delivery {
                    Delivery::Stale => info.listener.on_loading_cancelled(&info.uri),
                    Delivery::Shown => info.listener.on_loading_failed(&info.uri, &reason),
                    Delivery::Panicked(message) => {
                        error!(key = %info.key, panic = %message, "Failure placeholder panicked");
                        info.listener.on_loading_failed(&info.uri, &reason);
                    }
                }
            }),
        );
    }
}

fn is_blank(image: &DynamicImage) -> bool {
    image.width() == 0 || image.height() == 0
}

/// Reports disk-cache copy progress and stops the copy once the task is stale.
struct TaskCopyListener<'a> {
    task: &'a LoadAndDisplayTask,
}

impl CopyListener for TaskCopyListener<'_> {
    fn on_bytes_copied(&mut self, current: u64, total: u64) -> bool {
        self.task.info.options.sync_loading || self.task.fire_progress(current, total)
    }
}
