//! Pending call tracking
//!
//! Counts calls handed to the script runtime that have not finished yet.
//! The 0 -> 1 transition marks the bridge busy, 1 -> 0 marks it idle.

use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;

/// Observer of bridge busy/idle transitions
pub trait BridgeIdleListener: Send + Sync {
    fn on_transition_to_bridge_idle(&self) {}
    fn on_transition_to_bridge_busy(&self) {}
    fn on_bridge_destroyed(&self) {}
}

/// Counter of outstanding script calls
#[derive(Default)]
pub struct PendingCallCounter {
    count: Mutex<usize>,
    idle: Condvar,
    listeners: RwLock<Vec<Arc<dyn BridgeIdleListener>>>,
}

impl PendingCallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn BridgeIdleListener>) {
        self.listeners.write().push(listener);
    }

    pub fn increment(&self) {
        let became_busy = {
            let mut count = self.count.lock();
            *count += 1;
            *count == 1
        };
        if became_busy {
            log::trace!("Bridge busy");
            for listener in self.listeners.read().iter() {
                listener.on_transition_to_bridge_busy();
            }
        }
    }

    /// Mark `n` calls finished
    pub fn decrement_by(&self, n: usize) {
        if n == 0 {
            return;
        }
        let became_idle = {
            let mut count = self.count.lock();
            if *count < n {
                log::warn!("Pending call count underflow ({} < {})", *count, n);
            }
            let was_busy = *count > 0;
            *count = count.saturating_sub(n);
            if *count == 0 {
                self.idle.notify_all();
            }
            was_busy && *count == 0
        };
        if became_idle {
            log::trace!("Bridge idle");
            for listener in self.listeners.read().iter() {
                listener.on_transition_to_bridge_idle();
            }
        }
    }

    pub fn pending(&self) -> usize {
        *self.count.lock()
    }

    pub fn is_idle(&self) -> bool {
        self.pending() == 0
    }

    /// Block until idle or until `timeout` passes. Returns whether idle.
    pub fn wait_for_idle(&self, timeout: Duration) -> bool {
        let mut count = self.count.lock();
        if *count > 0 {
            let _ = self.idle.wait_while_for(&mut count, |c| *c > 0, timeout);
        }
        *count == 0
    }

    /// Drop every outstanding call and tell listeners the bridge is gone
    pub(crate) fn notify_destroyed(&self) {
        {
            let mut count = self.count.lock();
            *count = 0;
            self.idle.notify_all();
        }
        for listener in self.listeners.read().iter() {
            listener.on_bridge_destroyed();
        }
    }
}

impl std::fmt::Debug for PendingCallCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCallCounter")
            .field("pending", &self.pending())
            .finish()
    }
}
