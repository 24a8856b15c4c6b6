//! Port definitions for fetching and decoding image bytes.

use std::collections::HashMap;
use std::sync::Arc;

use image::DynamicImage;

use super::ImageStream;
use crate::domain::entities::{CacheKey, ImageScaleType, ImageSize, ViewScaleType};
use crate::domain::errors::LoadError;

/// Extra request parameters passed through to the transport, such as HTTP headers.
pub type ExtraParams = HashMap<String, String>;

/// Opens a byte stream for an image URI.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Opens `uri`. `Ok(None)` means the source exists but produced no data.
    async fn open(
        &self,
        uri: &str,
        extra: Option<&ExtraParams>,
    ) -> Result<Option<ImageStream>, LoadError>;
}

/// Everything a decoder needs to turn a URI into a sized image.
#[derive(Clone)]
pub struct DecodingInfo {
    /// Memory cache key of the request.
    pub cache_key: CacheKey,
    /// URI to read bytes from. Either the original URI or a `file://` cache path.
    pub image_uri: String,
    /// URI the caller asked for.
    pub original_uri: String,
    /// Size the decoded image is meant for.
    pub target_size: ImageSize,
    /// How the target fits the image.
    pub view_scale_type: ViewScaleType,
    /// How the decoder scales relative to `target_size`.
    pub image_scale_type: ImageScaleType,
    /// Transport used to open `image_uri`.
    pub transport: Arc<dyn Transport>,
    /// Extra transport parameters.
    pub extra: Option<Arc<ExtraParams>>,
}

impl std::fmt::Debug for DecodingInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodingInfo")
            .field("cache_key", &self.cache_key)
            .field("image_uri", &self.image_uri)
            .field("target_size", &self.target_size)
            .field("view_scale_type", &self.view_scale_type)
            .field("image_scale_type", &self.image_scale_type)
            .finish_non_exhaustive()
    }
}

/// Decodes image bytes into pixels.
#[async_trait::async_trait]
pub trait ImageDecoder: Send + Sync {
    /// Decodes the image described by `info`. `Ok(None)` means nothing usable was decoded.
    async fn decode(&self, info: &DecodingInfo) -> Result<Option<DynamicImage>, LoadError>;
}

/// Transforms a decoded image before caching or display.
pub trait ImageProcessor: Send + Sync {
    /// Returns the processed image, or `None` if processing failed.
    fn process(&self, image: Arc<DynamicImage>) -> Option<Arc<DynamicImage>>;
}

impl<F> ImageProcessor for F
where
    F: Fn(Arc<DynamicImage>) -> Option<Arc<DynamicImage>> + Send + Sync,
{
    fn process(&self, image: Arc<DynamicImage>) -> Option<Arc<DynamicImage>> {
        self(image)
    }
}
