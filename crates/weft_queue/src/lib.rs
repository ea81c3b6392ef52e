//! # weft_queue - Message Queue Threads
//!
//! Every piece of cross-thread work in Weft is marshaled through one of three
//! single-threaded FIFO executors:
//!
//! ```text
//!  script runtime ──► ScriptRuntime queue ──┐
//!                                           ├──► NativeModules queue ──► module methods
//!  platform host  ──► Ui queue ◄────────────┘        (mount batches, view events)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **One thread per role** - a queue never runs two tasks at once
//! 2. **FIFO** - tasks run in enqueue order, no priorities
//! 3. **Explicit blocking** - the only way to wait on another queue is
//!    `run_on_queue_sync`, which refuses round trips that would deadlock

pub mod queue;
pub mod config;
pub mod frame;

pub use queue::{
    panic_message, MessageQueueThread, QueueError, QueueExceptionHandler, QueueResult, QueueRole,
};
pub use config::{QueueConfiguration, QueueConfigurationSpec};
pub use frame::{FrameCallback, FrameCallbackId, FrameClock, FrameDriver};
