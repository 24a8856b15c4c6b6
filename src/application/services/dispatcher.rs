//! Sequential callback delivery.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::domain::ports::{Callback, CallbackExecutor};

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Runs `callback`, logging instead of unwinding if it panics.
pub(crate) fn run_guarded(callback: Callback) {
    if let Err(panic_info) = std::panic::catch_unwind(AssertUnwindSafe(callback)) {
        error!(panic = %panic_message(&*panic_info), "Load callback panicked");
    }
}

/// Runs callbacks one at a time, in submission order, on a single task.
///
/// Used for listener and display callbacks when the request has no executor of its own.
pub struct CallbackDispatcher {
    tx: mpsc::UnboundedSender<Callback>,
}

impl CallbackDispatcher {
    /// Spawns the draining task on `handle`.
    ///
    /// The task ends once every handle to the dispatcher is dropped.
    #[must_use]
    pub fn spawn(handle: &Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Callback>();
        handle.spawn(async move {
            while let Some(callback) = rx.recv().await {
                run_guarded(callback);
            }
            debug!("Callback dispatcher stopped");
        });
        Self { tx }
    }
}

impl CallbackExecutor for CallbackDispatcher {
    fn execute(&self, callback: Callback) {
        if self.tx.send(callback).is_err() {
            debug!("Callback dispatcher closed, dropping callback");
        }
    }
}

impl std::fmt::Debug for CallbackDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackDispatcher")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use parking_lot::Mutex;

    #[tokio::test]
    async fn test_runs_callbacks_in_order() {
        let dispatcher = CallbackDispatcher::spawn(&Handle::current());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();

        for i in 0..10 {
            let seen = Arc::clone(&seen);
            dispatcher.execute(Box::new(move || seen.lock().push(i)));
        }
        dispatcher.execute(Box::new(move || {
            let _ = done_tx.send(());
        }));
        done_rx.await.unwrap();

        assert_eq!(*seen.lock(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_stop_dispatcher() {
        let dispatcher = CallbackDispatcher::spawn(&Handle::current());
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();

        dispatcher.execute(Box::new(|| panic!("listener bug")));
        dispatcher.execute(Box::new(move || {
            let _ = done_tx.send(());
        }));

        assert!(done_rx.await.is_ok());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(&*payload), "Unknown panic");
    }
}
