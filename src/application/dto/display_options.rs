//! Per-request display options and request DTOs.

use std::sync::Arc;
use std::time::Duration;

use image::DynamicImage;

use crate::domain::entities::{ImageScaleType, ImageSize};
use crate::domain::ports::{
    CallbackExecutor, ExtraParams, ImageDisplayer, ImageLoadingListener, ImageProcessor,
    ProgressListener, SimpleDisplayer,
};

/// How a single request is loaded, cached and shown.
#[derive(Clone)]
pub struct DisplayImageOptions {
    /// Shown while the image loads.
    pub image_on_loading: Option<Arc<DynamicImage>>,
    /// Shown when the URI is empty.
    pub image_for_empty_uri: Option<Arc<DynamicImage>>,
    /// Shown when loading fails.
    pub image_on_fail: Option<Arc<DynamicImage>>,
    /// Clear the target before loading when no loading placeholder is set.
    pub reset_view_before_loading: bool,
    /// Keep the decoded image in the memory cache.
    pub cache_in_memory: bool,
    /// Keep the raw bytes in the disk cache.
    pub cache_on_disk: bool,
    /// How the decoder scales relative to the target size.
    pub image_scale_type: ImageScaleType,
    /// Wait before starting the load.
    pub delay_before_loading: Duration,
    /// Extra transport parameters, such as HTTP headers.
    pub extra_for_downloader: Option<Arc<ExtraParams>>,
    /// Runs on decoded images before they enter the memory cache.
    pub pre_processor: Option<Arc<dyn ImageProcessor>>,
    /// Runs on images after the memory cache, before display.
    pub post_processor: Option<Arc<dyn ImageProcessor>>,
    /// Puts the image on the target.
    pub displayer: Arc<dyn ImageDisplayer>,
    /// Where callbacks run. Defaults to the engine's completion dispatcher.
    pub callback_executor: Option<Arc<dyn CallbackExecutor>>,
    /// Run callbacks inline on the worker instead of posting them.
    pub sync_loading: bool,
}

impl Default for DisplayImageOptions {
    fn default() -> Self {
        Self {
            image_on_loading: None,
            image_for_empty_uri: None,
            image_on_fail: None,
            reset_view_before_loading: false,
            cache_in_memory: false,
            cache_on_disk: false,
            image_scale_type: ImageScaleType::default(),
            delay_before_loading: Duration::ZERO,
            extra_for_downloader: None,
            pre_processor: None,
            post_processor: None,
            displayer: Arc::new(SimpleDisplayer),
            callback_executor: None,
            sync_loading: false,
        }
    }
}

impl DisplayImageOptions {
    /// Creates options with nothing cached and no placeholders.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the loading placeholder.
    #[must_use]
    pub fn with_image_on_loading(mut self, image: Arc<DynamicImage>) -> Self {
        self.image_on_loading = Some(image);
        self
    }

    /// Sets the empty URI placeholder.
    #[must_use]
    pub fn with_image_for_empty_uri(mut self, image: Arc<DynamicImage>) -> Self {
        self.image_for_empty_uri = Some(image);
        self
    }

    /// Sets the failure placeholder.
    #[must_use]
    pub fn with_image_on_fail(mut self, image: Arc<DynamicImage>) -> Self {
        self.image_on_fail = Some(image);
        self
    }

    /// Clears the target before loading.
    #[must_use]
    pub const fn with_reset_view_before_loading(mut self, reset: bool) -> Self {
        self.reset_view_before_loading = reset;
        self
    }

    /// Enables or disables the memory cache.
    #[must_use]
    pub const fn with_cache_in_memory(mut self, enabled: bool) -> Self {
        self.cache_in_memory = enabled;
        self
    }

    /// Enables or disables the disk cache.
    #[must_use]
    pub const fn with_cache_on_disk(mut self, enabled: bool) -> Self {
        self.cache_on_disk = enabled;
        self
    }

    /// Sets the decode scale type.
    #[must_use]
    pub const fn with_image_scale_type(mut self, scale_type: ImageScaleType) -> Self {
        self.image_scale_type = scale_type;
        self
    }

    /// Delays the start of each load.
    #[must_use]
    pub const fn with_delay_before_loading(mut self, delay: Duration) -> Self {
        self.delay_before_loading = delay;
        self
    }

    /// Sets extra transport parameters.
    #[must_use]
    pub fn with_extra_for_downloader(mut self, extra: ExtraParams) -> Self {
        self.extra_for_downloader = Some(Arc::new(extra));
        self
    }

    /// Sets the pre-processor.
    #[must_use]
    pub fn with_pre_processor(mut self, processor: Arc<dyn ImageProcessor>) -> Self {
        self.pre_processor = Some(processor);
        self
    }

    /// Sets the post-processor.
    #[must_use]
    pub fn with_post_processor(mut self, processor: Arc<dyn ImageProcessor>) -> Self {
        self.post_processor = Some(processor);
        self
    }

    /// Sets the displayer.
    #[must_use]
    pub fn with_displayer(mut self, displayer: Arc<dyn ImageDisplayer>) -> Self {
        self.displayer = displayer;
        self
    }

    /// Runs callbacks on `executor`.
    #[must_use]
    pub fn with_callback_executor(mut self, executor: Arc<dyn CallbackExecutor>) -> Self {
        self.callback_executor = Some(executor);
        self
    }

    /// Runs callbacks inline on the worker.
    #[must_use]
    pub const fn with_sync_loading(mut self, sync: bool) -> Self {
        self.sync_loading = sync;
        self
    }
}

impl std::fmt::Debug for DisplayImageOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisplayImageOptions")
            .field("cache_in_memory", &self.cache_in_memory)
            .field("cache_on_disk", &self.cache_on_disk)
            .field("image_scale_type", &self.image_scale_type)
            .field("delay_before_loading", &self.delay_before_loading)
            .field("sync_loading", &self.sync_loading)
            .finish_non_exhaustive()
    }
}

/// Optional parts of a display request.
#[derive(Clone, Default)]
pub struct DisplayRequest {
    /// Options, or the configured defaults.
    pub options: Option<DisplayImageOptions>,
    /// Lifecycle listener, or the loader's default listener.
    pub listener: Option<Arc<dyn ImageLoadingListener>>,
    /// Download progress listener.
    pub progress_listener: Option<Arc<dyn ProgressListener>>,
}

impl DisplayRequest {
    /// Creates an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the options.
    #[must_use]
    pub fn with_options(mut self, options: DisplayImageOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Sets the listener.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn ImageLoadingListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Sets the progress listener.
    #[must_use]
    pub fn with_progress_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.progress_listener = Some(listener);
        self
    }
}

/// A display request for a caller without a display target.
#[derive(Clone, Default)]
pub struct LoadRequest {
    /// Decode size, or the configured maximum memory image size.
    pub target_size: Option<ImageSize>,
    /// Everything else.
    pub request: DisplayRequest,
}

impl LoadRequest {
    /// Creates an empty request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the decode size.
    #[must_use]
    pub const fn with_target_size(mut self, size: ImageSize) -> Self {
        self.target_size = Some(size);
        self
    }

    /// Sets the options.
    #[must_use]
    pub fn with_options(mut self, options: DisplayImageOptions) -> Self {
        self.request = self.request.with_options(options);
        self
    }

    /// Sets the listener.
    #[must_use]
    pub fn with_listener(mut self, listener: Arc<dyn ImageLoadingListener>) -> Self {
        self.request = self.request.with_listener(listener);
        self
    }

    /// Sets the progress listener.
    #[must_use]
    pub fn with_progress_listener(mut self, listener: Arc<dyn ProgressListener>) -> Self {
        self.request = self.request.with_progress_listener(listener);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cache_nothing() {
        let options = DisplayImageOptions::new();
        assert!(!options.cache_in_memory);
        assert!(!options.cache_on_disk);
        assert!(!options.sync_loading);
        assert_eq!(options.delay_before_loading, Duration::ZERO);
    }

    #[test]
    fn test_builder_sets_fields() {
        let options = DisplayImageOptions::new()
            .with_cache_in_memory(true)
            .with_cache_on_disk(true)
            .with_delay_before_loading(Duration::from_millis(10))
            .with_extra_for_downloader(ExtraParams::from([("X-Test".into(), "1".into())]));

        assert!(options.cache_in_memory && options.cache_on_disk);
        assert_eq!(options.delay_before_loading, Duration::from_millis(10));
        assert_eq!(
            options
                .extra_for_downloader
                .as_deref()
                .and_then(|extra| extra.get("X-Test"))
                .map(String::as_str),
            Some("1")
        );
    }
}
