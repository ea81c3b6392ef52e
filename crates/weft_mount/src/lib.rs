//! # weft_mount - Mounting Layer
//!
//! Applies mutation lists to the live view hierarchy on the UI queue and
//! routes view events back towards the script runtime.
//!
//! ```text
//!  MutationList ──► MountingManager (UI queue)
//!                      │  Create / Insert / Remove / Delete / Update
//!                      ▼
//!                   ViewInstance ── ViewManager (props, commands)
//!                      │
//!                      │ EventEmitter
//!                      ▼
//!                   EventDispatcher ── coalesce ──► EventBeat ──► script queue drain
//! ```
//!
//! ## Key Invariants
//!
//! 1. **UI thread only** - a manager bound to a queue refuses to mount elsewhere
//! 2. **Views by tag** - nothing outside this crate holds a view reference
//! 3. **Defects are loud** - inconsistent instructions fail the batch unless
//!    defensive clamping is enabled, in which case they are logged

pub mod config;
pub mod error;
pub mod event;
pub mod mounting;
pub mod view_manager;

pub use config::MountConfig;
pub use error::{MountError, MountResult};
pub use event::{Event, EventBeat, EventDispatcher, EventEmitter, TOP_LAYOUT};
pub use mounting::{BatchListener, BatchListeners, BatchReport, MountStats, MountingManager};
pub use view_manager::{
    CommandHandler, PropSetter, ViewFactory, ViewInstance, ViewManager, ViewManagerBuilder,
    ViewManagerRegistry,
};
