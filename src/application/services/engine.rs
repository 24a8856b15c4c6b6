//! Task engine: dispatch pools, target bindings and global load flags.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::dispatcher::{CallbackDispatcher, panic_message, run_guarded};
use super::display_task::ProcessAndDisplayTask;
use super::load_task::{ImageLoadingInfo, LoadAndDisplayTask};
use super::uri_locks::UriLockRegistry;
use crate::application::configuration::ImageLoaderConfiguration;
use crate::application::dto::DisplayImageOptions;
use crate::domain::entities::{CacheKey, TargetId};
use crate::domain::errors::LoaderError;
use crate::domain::ports::{Callback, CallbackExecutor, Transport};

/// One generation of worker slots. Replaced wholesale after `stop`.
#[derive(Clone)]
struct DispatchPools {
    generation: u64,
    cached: Arc<Semaphore>,
    network: Arc<Semaphore>,
    interrupt: CancellationToken,
}

/// Result of handing an image to its target.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// The target still expected the image and it was shown.
    Shown,
    /// The target was rebound before the image arrived.
    Stale,
    /// Displaying panicked with the given message.
    Panicked(String),
}

enum EngineState {
    Running(DispatchPools),
    Stopped,
}

/// Schedules load tasks and tracks which request each target currently expects.
pub struct ImageLoaderEngine {
    config: Arc<ImageLoaderConfiguration>,
    handle: Handle,
    state: Mutex<EngineState>,
    generations: AtomicU64,
    bindings: Mutex<HashMap<TargetId, CacheKey>>,
    locks: UriLockRegistry,
    paused: watch::Sender<bool>,
    network_denied: AtomicBool,
    slow_network: AtomicBool,
    dispatcher: CallbackDispatcher,
}

impl ImageLoaderEngine {
    /// Creates a stopped engine. Pools are provisioned by the first submission.
    ///
    /// # Errors
    /// Returns [`LoaderError::NoRuntime`] when no runtime is configured and none is current.
    pub fn new(config: ImageLoaderConfiguration) -> Result<Arc<Self>, LoaderError> {
        let handle = match &config.runtime {
            Some(handle) => handle.clone(),
            None => Handle::try_current().map_err(|_| LoaderError::NoRuntime)?,
        };
        let dispatcher = CallbackDispatcher::spawn(&handle);
        Ok(Arc::new(Self {
            config: Arc::new(config),
            handle,
            state: Mutex::new(EngineState::Stopped),
            generations: AtomicU64::new(0),
            bindings: Mutex::new(HashMap::new()),
            locks: UriLockRegistry::new(),
            paused: watch::Sender::new(false),
            network_denied: AtomicBool::new(false),
            slow_network: AtomicBool::new(false),
            dispatcher,
        }))
    }

    /// Returns the configuration.
    #[must_use]
    pub fn configuration(&self) -> &ImageLoaderConfiguration {
        &self.config
    }

    pub(crate) fn locks(&self) -> &UriLockRegistry {
        &self.locks
    }

    fn pools(&self) -> DispatchPools {
        let mut state = self.state.lock();
        match &*state {
            EngineState::Running(pools) => pools.clone(),
            EngineState::Stopped => {
                let size = self.config.thread_pool_size;
                let pools = DispatchPools {
                    generation: self.generations.fetch_add(1, Ordering::Relaxed) + 1,
                    cached: Arc::new(Semaphore::new(size)),
                    network: Arc::new(Semaphore::new(size)),
                    interrupt: CancellationToken::new(),
                };
                debug!(generation = pools.generation, size, "Provisioned dispatch pools");
                *state = EngineState::Running(pools.clone());
                pools
            }
        }
    }

    /// Returns true while a pool generation is live.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock(), EngineState::Running(_))
    }

    /// Routes a load task to the cached-image pool if its URI is on disk, else to the network pool.
    pub(crate) fn submit(self: &Arc<Self>, info: ImageLoadingInfo) {
        let pools = self.pools();
        let task = LoadAndDisplayTask::new(Arc::clone(self), info, pools.interrupt.clone());
        let disk_cache = Arc::clone(&self.config.disk_cache);
        self.handle.spawn(async move {
            let on_disk = disk_cache.get(task.uri()).await.is_some();
            let (pool, pool_name) = if on_disk {
                (&pools.cached, "cached")
            } else {
                (&pools.network, "network")
            };
            trace!(
                key = %task.key(),
                generation = pools.generation,
                pool = pool_name,
                "Dispatching load task"
            );
            let permit = tokio::select! {
                biased;
                () = pools.interrupt.cancelled() => None,
                permit = Arc::clone(pool).acquire_owned() => permit.ok(),
            };
            match permit {
                Some(_permit) => task.run().await,
                None => task.fire_cancelled(),
            }
        });
    }

    /// Runs a post-process-and-display task on the cached-image pool.
    pub(crate) fn submit_process(&self, task: ProcessAndDisplayTask) {
        let pools = self.pools();
        self.handle.spawn(async move {
            let permit = tokio::select! {
                biased;
                () = pools.interrupt.cancelled() => None,
                permit = Arc::clone(&pools.cached).acquire_owned() => permit.ok(),
            };
            match permit {
                Some(_permit) => task.run(),
                None => task.fire_cancelled(),
            }
        });
    }

    /// Binds `target` to the request identified by `key`, replacing any older binding.
    pub(crate) fn prepare_display_task_for(&self, target: TargetId, key: CacheKey) {
        self.bindings.lock().insert(target, key);
    }

    /// Drops the binding of `target`.
    pub fn cancel_display_task_for(&self, target: TargetId) {
        self.bindings.lock().remove(&target);
    }

    /// Key of the request `target` currently expects.
    #[must_use]
    pub fn loading_key_for(&self, target: TargetId) -> Option<CacheKey> {
        self.bindings.lock().get(&target).cloned()
    }

    /// Returns true if `target` still expects the request identified by `key`.
    pub(crate) fn is_current(&self, target: TargetId, key: &CacheKey) -> bool {
        self.bindings.lock().get(&target) == Some(key)
    }

    /// Runs `deliver` if `target` still expects `key`, then releases the binding.
    ///
    /// `deliver` runs without the binding lock held, so it may call back into the
    /// loader. A binding replaced while `deliver` runs is left in place.
    pub(crate) fn deliver_if_current(
        &self,
        target: TargetId,
        key: &CacheKey,
        deliver: impl FnOnce(),
    ) -> Delivery {
        if !self.is_current(target, key) {
            return Delivery::Stale;
        }
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(deliver));
        {
            let mut bindings = self.bindings.lock();
            if bindings.get(&target) == Some(key) {
                bindings.remove(&target);
            }
        }
        match outcome {
            Ok(()) => Delivery::Shown,
            Err(panic_info) => Delivery::Panicked(panic_message(&*panic_info)),
        }
    }

    /// Runs `callback` inline for synchronous requests, else on the request's executor
    /// or the completion dispatcher.
    pub(crate) fn fire_callback(&self, options: &DisplayImageOptions, callback: Callback) {
        if options.sync_loading {
            run_guarded(callback);
        } else if let Some(executor) = &options.callback_executor {
            executor.execute(callback);
        } else {
            self.dispatcher.execute(callback);
        }
    }

    /// Transport matching the current network flags.
    pub(crate) fn transport(&self) -> Arc<dyn Transport> {
        if self.network_denied.load(Ordering::Relaxed) {
            Arc::clone(&self.config.network_denied_transport)
        } else if self.slow_network.load(Ordering::Relaxed) {
            Arc::clone(&self.config.slow_network_transport)
        } else {
            Arc::clone(&self.config.transport)
        }
    }

    /// Holds new tasks before they start loading.
    pub fn pause(&self) {
        self.paused.send_replace(true);
        debug!("Engine paused");
    }

    /// Releases paused tasks.
    pub fn resume(&self) {
        self.paused.send_replace(false);
        debug!("Engine resumed");
    }

    /// Returns true while paused.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub(crate) async fn wait_until_resumed(&self) {
        let mut paused = self.paused.subscribe();
        let _ = paused.wait_for(|paused| !*paused).await;
    }

    /// Fails network loads with `NetworkDenied` while set.
    pub fn deny_network_downloads(&self, deny: bool) {
        self.network_denied.store(deny, Ordering::Relaxed);
    }

    /// Buffers whole network bodies before decoding while set.
    pub fn handle_slow_network(&self, slow: bool) {
        self.slow_network.store(slow, Ordering::Relaxed);
    }

    /// Interrupts every task of the current generation and clears all bindings.
    ///
    /// The next submission provisions a fresh generation.
    pub fn stop(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), EngineState::Stopped);
        if let EngineState::Running(pools) = previous {
            pools.interrupt.cancel();
            info!(generation = pools.generation, "Engine stopped");
        }
        self.bindings.lock().clear();
    }
}

impl std::fmt::Debug for ImageLoaderEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageLoaderEngine")
            .field("running", &self.is_running())
            .field("paused", &self.is_paused())
            .field("bindings", &self.bindings.lock().len())
            .finish_non_exhaustive()
    }
}
