//! Frame clock
//!
//! The frame clock is the source of per-frame callbacks (timers, idle
//! callbacks, event beats). Callbacks are persistent: once posted they fire
//! on every frame until removed.
//!
//! Frames are produced either by a [`FrameDriver`] ticking on its own thread
//! and posting each frame onto a queue, or manually through
//! [`FrameClock::do_frame`] for deterministic stepping.

use crate::queue::{MessageQueueThread, QueueError, QueueResult};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Callback invoked with the frame time in milliseconds
pub type FrameCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Handle for removing a posted frame callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameCallbackId(u64);

impl FrameCallbackId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Wall-clock time in milliseconds, the time base for frames and timers
pub fn now_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64() * 1000.0)
        .unwrap_or(0.0)
}

/// Source of frame callbacks
pub struct FrameClock {
    callbacks: Mutex<Vec<(FrameCallbackId, FrameCallback)>>,
    next_id: AtomicU64,
    frame_count: AtomicU64,
    last_frame_time: Mutex<Option<f64>>,
    frame_interval_ms: f64,
}

impl FrameClock {
    /// Create a clock whose nominal frame length is `frame_interval_ms`
    pub fn new(frame_interval_ms: f64) -> Self {
        Self {
            callbacks: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            frame_count: AtomicU64::new(0),
            last_frame_time: Mutex::new(None),
            frame_interval_ms,
        }
    }

    /// Nominal frame length in milliseconds
    pub fn frame_interval_ms(&self) -> f64 {
        self.frame_interval_ms
    }

    /// Register a callback that fires on every frame
    pub fn post_frame_callback(&self, callback: FrameCallback) -> FrameCallbackId {
        let id = FrameCallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks.lock().push((id, callback));
        id
    }

    /// Remove a callback. Returns false if it was not registered.
    pub fn remove_frame_callback(&self, id: FrameCallbackId) -> bool {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|(existing, _)| *existing != id);
        callbacks.len() != before
    }

    /// Number of registered callbacks
    pub fn callback_count(&self) -> usize {
        self.callbacks.lock().len()
    }

    /// Produce one frame at `frame_time_ms`
    pub fn do_frame(&self, frame_time_ms: f64) {
        // Snapshot so callbacks may post or remove callbacks while running
        let callbacks: Vec<FrameCallback> = self
            .callbacks
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();

        *self.last_frame_time.lock() = Some(frame_time_ms);
        self.frame_count.fetch_add(1, Ordering::Relaxed);

        for callback in callbacks {
            callback(frame_time_ms);
        }
    }

    /// Frames produced so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count.load(Ordering::Relaxed)
    }

    /// Time of the most recent frame
    pub fn last_frame_time(&self) -> Option<f64> {
        *self.last_frame_time.lock()
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(1000.0 / 60.0)
    }
}

impl std::fmt::Debug for FrameClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameClock")
            .field("callbacks", &self.callback_count())
            .field("frame_count", &self.frame_count())
            .field("frame_interval_ms", &self.frame_interval_ms)
            .finish()
    }
}

/// Ticks a [`FrameClock`] from a background thread.
///
/// Each tick posts `do_frame(now)` onto the target queue, so callbacks run
/// on that queue's thread.
pub struct FrameDriver {
    stop_tx: Sender<()>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl FrameDriver {
    /// Start ticking `clock` every `interval` onto `queue`
    pub fn start(
        clock: Arc<FrameClock>,
        queue: Arc<MessageQueueThread>,
        interval: Duration,
    ) -> QueueResult<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let name = format!("{}-frames", queue.name());

        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        let clock = Arc::clone(&clock);
                        let frame_time = now_ms();
                        if queue.run_on_queue(move || clock.do_frame(frame_time)).is_err() {
                            log::debug!("Frame driver target '{}' stopped", queue.name());
                            break;
                        }
                    }
                    _ => break,
                }
            })
            .map_err(|e| QueueError::SpawnFailed {
                name,
                reason: e.to_string(),
            })?;

        Ok(Self {
            stop_tx,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Stop ticking and join the ticker thread
    pub fn stop(&self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                log::error!("Frame driver thread terminated abnormally");
            }
        }
    }
}

impl Drop for FrameDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
