//! Per-key coalescing scheduler
//!
//! Each `schedule` call cancels the pending timer for its key and starts a new
//! one; when a timer expires the task runs only if it is still the latest one
//! scheduled for that key. `shutdown` cancels everything at once.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

struct Pending {
    generation: u64,
    token: CancellationToken,
}

pub struct Debouncer<K> {
    delay: Duration,
    pending: Arc<Mutex<HashMap<K, Pending>>>,
    next_generation: AtomicU64,
    root: CancellationToken,
}

impl<K> Debouncer<K>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
{
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            root: CancellationToken::new(),
        }
    }

    /// (Re)start the timer for `key`; `task` runs once it expires undisturbed.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&self, key: K, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.root.is_cancelled() {
            debug!("Debouncer shut down, ignoring trigger for {}", key);
            return;
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = self.root.child_token();
        let previous = self.pending.lock().insert(
            key.clone(),
            Pending {
                generation,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            trace!("Resetting debounce timer for {}", key);
            previous.token.cancel();
        }

        let pending = self.pending.clone();
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            {
                let mut map = pending.lock();
                match map.get(&key) {
                    Some(p) if p.generation == generation => {
                        map.remove(&key);
                    }
                    _ => return,
                }
            }

            task().await;
        });
    }

    /// Drop the pending timer for `key`. Returns whether one existed.
    pub fn cancel(&self, key: &K) -> bool {
        match self.pending.lock().remove(key) {
            Some(p) => {
                p.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Cancel every pending timer and refuse new ones.
    pub fn shutdown(&self) {
        self.root.cancel();
        let dropped = std::mem::take(&mut *self.pending.lock()).len();
        debug!("Debouncer shut down, {} pending timers cancelled", dropped);
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        self.root.cancel();
    }
}
