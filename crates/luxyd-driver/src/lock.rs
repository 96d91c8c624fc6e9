//! Interruptible control lock
//!
//! One lock serializes every control-plane command on a device. Waiting for
//! it can take arbitrarily long (another session may be in a hardware wait),
//! so a waiter polls its [`CancelToken`] between timed acquisition attempts
//! and gives up with `Interrupted` when the token fires. The token is
//! consumed by that failure, the way a delivered signal is.

use crate::error::{LuxydError, Result};
use parking_lot::{Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cancellation flag for one session's lock waits
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Fresh, unfired token
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the token; the next blocked (or blocking) lock wait fails
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether the token has fired and not been consumed yet
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Consume a pending cancellation
    fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }
}

/// Mutex with cancellable acquisition
#[derive(Debug)]
pub struct ControlLock<T> {
    inner: Mutex<T>,
    poll: Duration,
}

impl<T> ControlLock<T> {
    /// Wrap `value`; waiters re-check their token every `poll`
    pub fn new(value: T, poll: Duration) -> Self {
        Self {
            inner: Mutex::new(value),
            poll,
        }
    }

    /// Acquire, or fail with `Interrupted` if `cancel` fires while waiting
    ///
    /// An uncontended lock is taken immediately even with a pending
    /// cancellation, which is then left for the next contended wait.
    ///
    /// # Errors
    ///
    /// Returns `Interrupted` if the token fires before the lock is obtained.
    pub fn lock_interruptible(&self, cancel: &CancelToken) -> Result<MutexGuard<'_, T>> {
        if let Some(guard) = self.inner.try_lock() {
            return Ok(guard);
        }

        loop {
            if cancel.take() {
                tracing::debug!("Control lock wait interrupted");
                return Err(LuxydError::Interrupted);
            }
            if let Some(guard) = self.inner.try_lock_for(self.poll) {
                return Ok(guard);
            }
        }
    }

    /// Acquire without cancellation (attach/detach paths)
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }
}
