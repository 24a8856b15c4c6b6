//! Application layer: loader configuration, request DTOs and the load engine.

/// Loader configuration.
pub mod configuration;
/// Data transfer objects.
pub mod dto;
/// Engine, tasks and the loader facade.
pub mod services;

pub use configuration::ImageLoaderConfiguration;
pub use dto::{DisplayImageOptions, DisplayRequest, LoadRequest};
pub use services::{ImageLoader, ImageLoaderEngine, ImageSurface, NonViewAware, ViewAware};
