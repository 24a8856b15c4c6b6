//! Default image decoder built on the `image` crate.

use image::DynamicImage;
use image::imageops::FilterType;
use tokio::io::AsyncReadExt;
use tracing::{debug, trace};

use crate::domain::entities::{ImageScaleType, ImageSize, ViewScaleType};
use crate::domain::errors::LoadError;
use crate::domain::ports::{DecodingInfo, ImageDecoder};

/// Reads the whole stream, decodes it off the async runtime and scales the
/// result according to the request's scale types.
#[derive(Debug, Clone, Copy)]
pub struct DefaultImageDecoder {
    filter: FilterType,
}

impl Default for DefaultImageDecoder {
    fn default() -> Self {
        Self {
            filter: FilterType::Lanczos3,
        }
    }
}

impl DefaultImageDecoder {
    /// Creates a decoder resampling with `filter`.
    #[must_use]
    pub const fn with_filter(filter: FilterType) -> Self {
        Self { filter }
    }
}

/// Scale factor fitting `source` into `target` for the given scale types.
///
/// Returns `None` when the image should be kept as is.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_scale(
    source: ImageSize,
    target: ImageSize,
    view_scale_type: ViewScaleType,
    image_scale_type: ImageScaleType,
) -> Option<f32> {
    if image_scale_type == ImageScaleType::None || source.is_empty() || target.is_empty() {
        return None;
    }
    let width_scale = target.width as f32 / source.width as f32;
    let height_scale = target.height as f32 / source.height as f32;
    let scale = match view_scale_type {
        ViewScaleType::FitInside => width_scale.min(height_scale),
        ViewScaleType::Crop => width_scale.max(height_scale),
    };
    let upscale_allowed = image_scale_type == ImageScaleType::ExactlyStretched;
    if scale < 1.0 || (scale > 1.0 && upscale_allowed) {
        Some(scale)
    } else {
        None
    }
}

#[async_trait::async_trait]
impl ImageDecoder for DefaultImageDecoder {
    async fn decode(&self, info: &DecodingInfo) -> Result<Option<DynamicImage>, LoadError> {
        let Some(mut stream) = info
            .transport
            .open(&info.image_uri, info.extra.as_deref())
            .await?
        else {
            return Err(LoadError::NoStream {
                uri: info.image_uri.clone(),
            });
        };

        let mut bytes = Vec::new();
        stream.reader().read_to_end(&mut bytes).await?;
        trace!(key = %info.cache_key, size = bytes.len(), "Read image bytes");

        let target = info.target_size;
        let view_scale_type = info.view_scale_type;
        let image_scale_type = info.image_scale_type;
        let filter = self.filter;
        let decoded = tokio::task::spawn_blocking(move || -> Result<DynamicImage, LoadError> {
            let image = image::load_from_memory(&bytes)?;
            let source = ImageSize::new(image.width(), image.height());
            Ok(
                match compute_scale(source, target, view_scale_type, image_scale_type) {
                    Some(scale) => {
                        let scaled = source.scale(scale);
                        image.resize_exact(scaled.width.max(1), scaled.height.max(1), filter)
                    }
                    None => image,
                },
            )
        })
        .await
        .map_err(|e| LoadError::unexpected(format!("Decode task panicked: {e}")))??;

        if decoded.width() == 0 || decoded.height() == 0 {
            return Ok(None);
        }
        debug!(
            key = %info.cache_key,
            width = decoded.width(),
            height = decoded.height(),
            "Decoded image"
        );
        Ok(Some(decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::CacheKey;
    use crate::domain::errors::FailType;
    use crate::domain::ports::mocks::{MockTransport, png_bytes};
    use std::sync::Arc;
    use test_case::test_case;

    fn info(uri: &str, target: ImageSize, transport: Arc<MockTransport>) -> DecodingInfo {
        DecodingInfo {
            cache_key: CacheKey::new(uri, target),
            image_uri: uri.to_string(),
            original_uri: uri.to_string(),
            target_size: target,
            view_scale_type: ViewScaleType::FitInside,
            image_scale_type: ImageScaleType::Exactly,
            transport,
            extra: None,
        }
    }

    #[test_case(ImageSize::new(100, 50), ImageSize::new(50, 50), ViewScaleType::FitInside, ImageScaleType::Exactly, Some(0.5) ; "fit inside downscales")]
    #[test_case(ImageSize::new(100, 50), ImageSize::new(50, 50), ViewScaleType::Crop, ImageScaleType::Exactly, None ; "crop already covers")]
    #[test_case(ImageSize::new(10, 10), ImageSize::new(20, 20), ViewScaleType::Crop, ImageScaleType::Exactly, None ; "exactly never upscales")]
    #[test_case(ImageSize::new(10, 10), ImageSize::new(20, 20), ViewScaleType::Crop, ImageScaleType::ExactlyStretched, Some(2.0) ; "stretched upscales")]
    #[test_case(ImageSize::new(100, 100), ImageSize::new(10, 10), ViewScaleType::Crop, ImageScaleType::None, None ; "none keeps size")]
    fn test_compute_scale(
        source: ImageSize,
        target: ImageSize,
        view: ViewScaleType,
        scale_type: ImageScaleType,
        expected: Option<f32>,
    ) {
        assert_eq!(compute_scale(source, target, view, scale_type), expected);
    }

    #[tokio::test]
    async fn test_decode_scales_down_to_target() {
        let transport = MockTransport::new();
        transport.insert("http://x/a.png", png_bytes(80, 40));

        let image = DefaultImageDecoder::default()
            .decode(&info("http://x/a.png", ImageSize::new(20, 20), transport))
            .await
            .unwrap()
            .unwrap();

        assert_eq!((image.width(), image.height()), (20, 10));
    }

    #[tokio::test]
    async fn test_decode_garbage_is_decoding_error() {
        let transport = MockTransport::new();
        transport.insert("http://x/bad", b"definitely not an image".to_vec());

        let err = DefaultImageDecoder::default()
            .decode(&info("http://x/bad", ImageSize::new(20, 20), transport))
            .await
            .unwrap_err();

        assert_eq!(err.fail_type(), FailType::DecodingError);
    }
}
