mod disk_cache_port;
mod image_aware_port;
mod listener_port;
mod memory_cache_port;
mod transport_port;

pub use disk_cache_port::{CopyListener, DiskCache, FileNameGenerator, ImageStream};
pub use image_aware_port::{ImageAware, ImageDisplayer, SimpleDisplayer};
pub use listener_port::{
    Callback, CallbackExecutor, ImageLoadingListener, NoopLoadingListener, ProgressListener,
};
pub use memory_cache_port::MemoryCache;
pub use transport_port::{DecodingInfo, ExtraParams, ImageDecoder, ImageProcessor, Transport};

#[cfg(test)]
pub mod mocks;
