//! Process-wide shutdown signal for blocking loops.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

/// One-shot cancellation flag that sleeping loops can wait on.
///
/// Cloning shares the flag. Once triggered it stays triggered.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock().unwrap_or_else(|p| p.into_inner()) = true;
        cvar.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        let (flag, _) = &*self.inner;
        *flag.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Sleep for up to `timeout`, waking early on trigger.
    ///
    /// Returns `true` if the signal is triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(|p| p.into_inner());
        let (guard, _) = match cvar.wait_timeout_while(guard, timeout, |triggered| !*triggered) {
            Ok(res) => res,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard
    }
}
