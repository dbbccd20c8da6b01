//! Cooperative cancellation
//!
//! A `Shutdown` is shared by every control loop in the process. Triggering
//! it wakes any loop currently waiting out its interval.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Cloneable cancellation token with a cancelable sleep
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request every holder of this token to stop
    pub fn trigger(&self) {
        let (flag, signal) = &*self.inner;
        *flag.lock().unwrap_or_else(|e| e.into_inner()) = true;
        signal.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep for `timeout` or until triggered
    ///
    /// Returns `true` if the token was triggered before the timeout elapsed.
    pub fn wait(&self, timeout: Duration) -> bool {
        let (flag, signal) = &*self.inner;
        let deadline = Instant::now() + timeout;
        let mut triggered = flag.lock().unwrap_or_else(|e| e.into_inner());

        while !*triggered {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            triggered = signal
                .wait_timeout(triggered, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        true
    }
}
