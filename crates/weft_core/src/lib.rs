//! # weft_core - Shared Primitives
//!
//! Types every other Weft crate speaks in:
//!
//! - **Tag**: opaque identity of one UI element, shared by the shadow tree
//!   and the mounting layer. Views are only ever referenced by tag.
//! - **SurfaceId**: one independently startable root UI tree.
//! - **CallbackId**: a script-side function handle passed through the bridge.
//! - **Value**: the dynamic value representation exchanged with the script runtime.

pub mod id;
pub mod value;

pub use id::{CallbackId, SurfaceId, Tag};
pub use value::Value;
