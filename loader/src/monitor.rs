//! Cooperative cancellation.

use core::sync::atomic::{AtomicBool, Ordering};

/// Polled by long-running passes between iterations.
pub trait TaskMonitor {
    /// Whether the caller asked to stop.
    fn is_cancelled(&self) -> bool;
}

impl<F: Fn() -> bool> TaskMonitor for F {
    fn is_cancelled(&self) -> bool {
        self()
    }
}

/// Monitor that never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCancel;

impl TaskMonitor for NoCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Cancellation flag that can be set from another thread.
#[derive(Debug, Default)]
pub struct CancelToken {
    cancelled: AtomicBool,
}

impl CancelToken {
    /// New, not cancelled.
    pub const fn new() -> Self {
        Self {
            cancelled: AtomicBool::new(false),
        }
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Clear a previous request.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}

impl TaskMonitor for CancelToken {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
