//! Final delivery of a loaded image, and post-processing of memory cache hits.

use std::sync::Arc;

use image::DynamicImage;
use tracing::{debug, error};

use super::engine::{Delivery, ImageLoaderEngine};
use super::load_task::ImageLoadingInfo;
use crate::domain::entities::{CacheKey, ImageSource, LoadedImage};
use crate::domain::errors::{FailReason, FailType};
use crate::domain::ports::ImageProcessor;

/// Runs `processor`, keeping the unprocessed image if it returns nothing.
pub(crate) fn process_image(
    processor: &dyn ImageProcessor,
    image: Arc<DynamicImage>,
    key: &CacheKey,
    stage: &str,
) -> Arc<DynamicImage> {
    debug!(key = %key, stage, "Processing image");
    match processor.process(Arc::clone(&image)) {
        Some(processed) => processed,
        None => {
            error!(key = %key, stage, "Image processor returned nothing, using unprocessed image");
            image
        }
    }
}

/// Shows an image on its target if the target still expects it.
pub(crate) struct DisplayImageTask {
    engine: Arc<ImageLoaderEngine>,
    info: Arc<ImageLoadingInfo>,
    image: Arc<DynamicImage>,
    source: ImageSource,
}

impl DisplayImageTask {
    pub(crate) const fn new(
        engine: Arc<ImageLoaderEngine>,
        info: Arc<ImageLoadingInfo>,
        image: Arc<DynamicImage>,
        source: ImageSource,
    ) -> Self {
        Self {
            engine,
            info,
            image,
            source,
        }
    }

    /// Hands the task to the request's callback context.
    pub(crate) fn post(self) {
        let engine = Arc::clone(&self.engine);
        let info = Arc::clone(&self.info);
        engine.fire_callback(&info.options, Box::new(move || self.run()));
    }

    fn run(self) {
        let info = &self.info;
        if info.target.is_collected() {
            debug!(key = %info.key, "Target was collected, skipping display");
            info.listener.on_loading_cancelled(&info.uri);
            return;
        }

        let displayer = &info.options.displayer;
        let delivery = self.engine.deliver_if_current(info.target.id(), &info.key, || {
            displayer.display(Arc::clone(&self.image), info.target.as_ref(), self.source);
        });
        report_delivery(info, delivery, self.image, self.source);
    }
}

/// Sends the terminal callback matching `delivery`.
pub(crate) fn report_delivery(
    info: &ImageLoadingInfo,
    delivery: Delivery,
    image: Arc<DynamicImage>,
    source: ImageSource,
) {
    match delivery {
        Delivery::Shown => {
            debug!(key = %info.key, source = %source, "Displayed image");
            let loaded = LoadedImage::new(info.key.clone(), image, source);
            info.listener.on_loading_complete(&info.uri, Some(&loaded));
        }
        Delivery::Stale => {
            debug!(key = %info.key, "Target was reused for another image, skipping display");
            info.listener.on_loading_cancelled(&info.uri);
        }
        Delivery::Panicked(message) => {
            error!(key = %info.key, panic = %message, "Displaying image panicked");
            info.listener
                .on_loading_failed(&info.uri, &FailReason::new(FailType::Unknown));
        }
    }
}

/// Post-processes a memory cache hit off the caller's thread, then displays it.
pub(crate) struct ProcessAndDisplayTask {
    engine: Arc<ImageLoaderEngine>,
    info: Arc<ImageLoadingInfo>,
    image: Arc<DynamicImage>,
}

impl ProcessAndDisplayTask {
    pub(crate) fn new(
        engine: Arc<ImageLoaderEngine>,
        info: ImageLoadingInfo,
        image: Arc<DynamicImage>,
    ) -> Self {
        Self {
            engine,
            info: Arc::new(info),
            image,
        }
    }

    pub(crate) fn run(self) {
        let image = match &self.info.options.post_processor {
            Some(processor) => {
                process_image(processor.as_ref(), self.image, &self.info.key, "post-processor")
            }
            None => self.image,
        };
        DisplayImageTask::new(self.engine, self.info, image, ImageSource::MemoryCache).post();
    }

    pub(crate) fn fire_cancelled(&self) {
        let info = Arc::clone(&self.info);
        self.engine.fire_callback(
            &self.info.options,
            Box::new(move || info.listener.on_loading_cancelled(&info.uri)),
        );
    }
}
