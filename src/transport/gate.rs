use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Time-windowed latch for the session-expiry toast.
///
/// Many in-flight requests can fail with 401 at once; only the first one
/// inside a window gets to notify. The latch reopens on its own once the
/// window has elapsed, so a later, independent expiry is reported again.
#[derive(Debug)]
pub(crate) struct ToastGate {
    window: Duration,
    last_fired: Mutex<Option<Instant>>,
}

impl ToastGate {
    pub(crate) fn new(window: Duration) -> Self {
        Self {
            window,
            last_fired: Mutex::new(None),
        }
    }

    /// Returns `true` if the caller may notify, and closes the latch.
    pub(crate) fn try_acquire(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last_fired.lock().unwrap_or_else(PoisonError::into_inner);
        match *last {
            Some(fired) if now.duration_since(fired) < self.window => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}
