//! Named locks shared by every process attached to a store.
//!
//! A lock is a row with an `active` flag. Taking it is a compare-and-set on
//! that flag, retried up to [`LockOptions::try_max`] times. Between attempts
//! a waiter parks on an in-process [`Notify`] for the name, bounded by
//! [`LockOptions::try_interval`]: a release in this process wakes it at
//! once, a release elsewhere is seen on the next poll.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use slotdb_storage::Store;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::config::LockOptions;
use crate::error::{CoreError, CoreResult};
use crate::retry::{with_retry, RetryConfig};

/// Acquires and releases named locks.
#[derive(Debug)]
pub struct LockManager {
    store: Arc<dyn Store>,
    options: LockOptions,
    retry: RetryConfig,
    waiters: Mutex<HashMap<String, Arc<Notify>>>,
}

impl LockManager {
    /// Creates a lock manager over `store`.
    pub fn new(store: Arc<dyn Store>, options: LockOptions, retry: RetryConfig) -> Self {
        Self {
            store,
            options,
            retry,
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Default retry budget of this manager.
    pub fn options(&self) -> LockOptions {
        self.options
    }

    fn notify_for(&self, name: &str) -> Arc<Notify> {
        Arc::clone(
            self.waiters
                .lock()
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Notify::new())),
        )
    }

    /// Take the lock `name`, waiting up to the retry budget.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LockTimeout`] when every attempt found the lock
    /// held.
    pub async fn wait_to_lock(&self, name: &str, options: LockOptions) -> CoreResult<()> {
        let notify = self.notify_for(name);
        for attempt in 0..options.try_max.max(1) {
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if with_retry(&self.retry, || self.store.try_lock(name)).await? {
                debug!("took lock {} after {} attempts", name, attempt + 1);
                return Ok(());
            }
            if attempt + 1 < options.try_max {
                let _ = tokio::time::timeout(options.try_interval, notified).await;
            }
        }
        warn!("gave up waiting for lock {}", name);
        Err(CoreError::lock_timeout(name))
    }

    /// Release the lock `name` and wake local waiters.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be updated.
    pub async fn release(&self, name: &str) -> CoreResult<()> {
        let result = with_retry(&self.retry, || self.store.unlock(name)).await;
        self.notify_for(name).notify_waiters();
        result
    }

    /// Run `action` while holding the lock `name`.
    ///
    /// The lock is released whether `action` succeeds or fails, and also
    /// when the returned future is dropped before completion.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LockTimeout`] if the lock cannot be taken, or
    /// the error of `action`.
    pub async fn lock_while<T, F, Fut>(&self, name: &str, action: F) -> CoreResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = CoreResult<T>>,
    {
        self.wait_to_lock(name, self.options).await?;
        let mut guard = ReleaseOnDrop {
            store: Arc::clone(&self.store),
            notify: self.notify_for(name),
            name: name.to_string(),
            armed: true,
        };

        let result = action().await;

        guard.armed = false;
        let released = self.release(name).await;
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(err), _) => Err(err),
            (Ok(_), Err(err)) => Err(err),
        }
    }

    /// Release every lock, e.g. ones left behind by a crashed process.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be updated.
    pub async fn unlock_all(&self) -> CoreResult<u64> {
        let released = with_retry(&self.retry, || self.store.unlock_all()).await?;
        for notify in self.waiters.lock().values() {
            notify.notify_waiters();
        }
        if released > 0 {
            debug!("released {} stale locks", released);
        }
        Ok(released)
    }
}

/// Releases a lock from a spawned task if `lock_while` is cancelled.
struct ReleaseOnDrop {
    store: Arc<dyn Store>,
    notify: Arc<Notify>,
    name: String,
    armed: bool,
}

impl Drop for ReleaseOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("lock {} left held: no runtime to release it", self.name);
            return;
        };
        let store = Arc::clone(&self.store);
        let notify = Arc::clone(&self.notify);
        let name = std::mem::take(&mut self.name);
        handle.spawn(async move {
            if let Err(err) = store.unlock(&name).await {
                warn!("failed to release lock {}: {}", name, err);
            }
            notify.notify_waiters();
        });
    }
}
