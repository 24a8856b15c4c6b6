//! Port definitions for load callbacks.

use crate::domain::entities::LoadedImage;
use crate::domain::errors::FailReason;

/// Receives the lifecycle of a load request.
///
/// For each request `on_loading_started` fires first, then exactly one of the
/// other three.
pub trait ImageLoadingListener: Send + Sync {
    /// Loading has started.
    fn on_loading_started(&self, _uri: &str) {}

    /// Loading failed.
    fn on_loading_failed(&self, _uri: &str, _reason: &FailReason) {}

    /// Loading finished. `image` is `None` for an empty URI.
    fn on_loading_complete(&self, _uri: &str, _image: Option<&LoadedImage>) {}

    /// Loading was cancelled because the target was rebound, collected, or the engine stopped.
    fn on_loading_cancelled(&self, _uri: &str) {}
}

/// Listener that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLoadingListener;

impl ImageLoadingListener for NoopLoadingListener {}

/// Receives download progress.
pub trait ProgressListener: Send + Sync {
    /// `total` is 0 when the length is unknown.
    fn on_progress_update(&self, uri: &str, current: u64, total: u64);
}

/// A deferred callback.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Runs callbacks on a caller-chosen context, such as a UI thread.
pub trait CallbackExecutor: Send + Sync {
    /// Schedules `callback`.
    fn execute(&self, callback: Callback);
}
