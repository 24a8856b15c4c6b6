//! Load engine, tasks and the loader facade.

mod dispatcher;
mod display_task;
mod engine;
mod image_aware;
mod image_loader;
mod load_task;
mod uri_locks;

pub use dispatcher::CallbackDispatcher;
pub use engine::ImageLoaderEngine;
pub use image_aware::{ImageSurface, NonViewAware, ViewAware};
pub use image_loader::ImageLoader;
pub use uri_locks::{UriLockGuard, UriLockRegistry};
