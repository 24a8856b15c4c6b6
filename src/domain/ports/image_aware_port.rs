//! Port definitions for display targets.

use std::sync::Arc;

use image::DynamicImage;

use crate::domain::entities::{ImageSize, ImageSource, TargetId, ViewScaleType};

/// Something an image can be shown on.
pub trait ImageAware: Send + Sync {
    /// Stable identity used to bind the target to its current request.
    fn id(&self) -> TargetId;

    /// Current size of the target. Zero dimensions mean "not laid out yet".
    fn size(&self) -> ImageSize {
        ImageSize::default()
    }

    /// How the target fits images into its bounds.
    fn scale_type(&self) -> ViewScaleType {
        ViewScaleType::Crop
    }

    /// Returns true once the underlying surface is gone.
    fn is_collected(&self) -> bool;

    /// Shows `image` (or clears the target on `None`). Returns false if nothing was shown.
    fn set_image(&self, image: Option<Arc<DynamicImage>>) -> bool;
}

/// Puts a loaded image on a target.
///
/// A panic while displaying is reported to the listener as an `Unknown` failure.
pub trait ImageDisplayer: Send + Sync {
    /// Displays `image` on `target`.
    fn display(&self, image: Arc<DynamicImage>, target: &dyn ImageAware, source: ImageSource);
}

/// Displayer that sets the image as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleDisplayer;

impl ImageDisplayer for SimpleDisplayer {
    fn display(&self, image: Arc<DynamicImage>, target: &dyn ImageAware, _source: ImageSource) {
        target.set_image(Some(image));
    }
}
