//! Display target adapters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use image::DynamicImage;

use crate::domain::entities::{ImageSize, TargetId, ViewScaleType};
use crate::domain::ports::ImageAware;

/// A caller-owned surface that can show an image.
pub trait ImageSurface: Send + Sync + 'static {
    /// Current size. Zero dimensions mean "not laid out yet".
    fn size(&self) -> ImageSize {
        ImageSize::default()
    }

    /// How the surface fits images into its bounds.
    fn scale_type(&self) -> ViewScaleType {
        ViewScaleType::Crop
    }

    /// Shows or clears an image.
    fn set_image(&self, image: Option<Arc<DynamicImage>>);
}

/// Binds a surface without keeping it alive.
///
/// The target counts as collected once the caller drops its last `Arc` to the surface.
pub struct ViewAware<S: ImageSurface> {
    id: TargetId,
    surface: Weak<S>,
}

impl<S: ImageSurface> ViewAware<S> {
    /// Wraps `surface`. Targets wrapping the same surface share an id.
    #[must_use]
    pub fn new(surface: &Arc<S>) -> Self {
        Self {
            id: TargetId(Arc::as_ptr(surface).cast::<()>() as usize as u64 & !NON_VIEW_BIT),
            surface: Arc::downgrade(surface),
        }
    }

    /// Returns the surface if it is still alive.
    #[must_use]
    pub fn surface(&self) -> Option<Arc<S>> {
        self.surface.upgrade()
    }
}

impl<S: ImageSurface> ImageAware for ViewAware<S> {
    fn id(&self) -> TargetId {
        self.id
    }

    fn size(&self) -> ImageSize {
        self.surface().map(|s| s.size()).unwrap_or_default()
    }

    fn scale_type(&self) -> ViewScaleType {
        self.surface().map(|s| s.scale_type()).unwrap_or_default()
    }

    fn is_collected(&self) -> bool {
        self.surface.strong_count() == 0
    }

    fn set_image(&self, image: Option<Arc<DynamicImage>>) -> bool {
        match self.surface() {
            Some(surface) => {
                surface.set_image(image);
                true
            }
            None => false,
        }
    }
}

const NON_VIEW_BIT: u64 = 1 << 63;
static NEXT_NON_VIEW_ID: AtomicU64 = AtomicU64::new(1);

/// A target with a size but no surface, used for loads without a display target.
///
/// Every instance gets its own id, so concurrent loads never rebind each other.
#[derive(Debug)]
pub struct NonViewAware {
    id: TargetId,
    size: ImageSize,
    scale_type: ViewScaleType,
}

impl NonViewAware {
    /// Creates a target of `size`.
    #[must_use]
    pub fn new(size: ImageSize, scale_type: ViewScaleType) -> Self {
        Self {
            id: TargetId(NEXT_NON_VIEW_ID.fetch_add(1, Ordering::Relaxed) | NON_VIEW_BIT),
            size,
            scale_type,
        }
    }
}

impl ImageAware for NonViewAware {
    fn id(&self) -> TargetId {
        self.id
    }

    fn size(&self) -> ImageSize {
        self.size
    }

    fn scale_type(&self) -> ViewScaleType {
        self.scale_type
    }

    fn is_collected(&self) -> bool {
        false
    }

    fn set_image(&self, _image: Option<Arc<DynamicImage>>) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Surface {
        shown: Mutex<usize>,
    }

    impl ImageSurface for Surface {
        fn size(&self) -> ImageSize {
            ImageSize::new(40, 30)
        }

        fn set_image(&self, _image: Option<Arc<DynamicImage>>) {
            *self.shown.lock() += 1;
        }
    }

    #[test]
    fn test_view_aware_follows_surface_lifetime() {
        let surface = Arc::new(Surface::default());
        let target = ViewAware::new(&surface);

        assert!(!target.is_collected());
        assert_eq!(target.size(), ImageSize::new(40, 30));
        assert!(target.set_image(None));
        assert_eq!(*surface.shown.lock(), 1);

        drop(surface);
        assert!(target.is_collected());
        assert!(!target.set_image(None));
        assert_eq!(target.size(), ImageSize::default());
    }

    #[test]
    fn test_same_surface_same_id() {
        let surface = Arc::new(Surface::default());
        assert_eq!(ViewAware::new(&surface).id(), ViewAware::new(&surface).id());
    }

    #[test]
    fn test_non_view_ids_are_unique() {
        let a = NonViewAware::new(ImageSize::new(1, 1), ViewScaleType::Crop);
        let b = NonViewAware::new(ImageSize::new(1, 1), ViewScaleType::Crop);
        assert_ne!(a.id(), b.id());
        assert!(!a.is_collected());
    }
}
