//! Domain entity definitions.

mod image;

pub use image::{
    CacheKey, ImageScaleType, ImageSize, ImageSource, LoadedImage, Scheme, TargetId,
    ViewScaleType,
};
