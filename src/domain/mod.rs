//! Domain layer with core entities and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{CacheKey, ImageSize, ImageSource, LoadedImage};
pub use errors::{FailReason, FailType, LoadError};
pub use ports::{DiskCache, ImageAware, ImageLoadingListener, MemoryCache};
