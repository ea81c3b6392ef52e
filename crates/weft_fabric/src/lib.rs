//! # weft_fabric - Shadow Tree & Differencing Engine
//!
//! Every commit produces a new immutable tree of [`ShadowNode`]s. The
//! differ compares it against the last committed tree and emits the
//! ordered [`MutationInstruction`]s that turn one into the other.
//!
//! ```text
//!  committed tree (rev N) ─┐
//!                          ├──► diff ──► MutationList { Remove*, Delete*, Create*, Update*, Insert* }
//!  new tree (rev N+1) ─────┘                    │
//!                                               ▼
//!                                        mounting layer (UI queue)
//! ```
//!
//! ## Key Invariants
//!
//! 1. **Immutable snapshots** - nodes are never mutated; changes produce new
//!    nodes that share unchanged subtrees through `Arc`
//! 2. **Unchanged subtrees are free** - a subtree equal to its committed
//!    counterpart emits nothing
//! 3. **Tree-edit order** - a view is removed from its parent, and emptied
//!    of its children, before it is deleted
//! 4. **All or nothing** - a malformed tree fails the commit and the
//!    previous tree stays authoritative

pub mod differ;
pub mod error;
pub mod mutation;
pub mod node;
pub mod tree;

pub use differ::{diff, teardown};
pub use error::{FabricError, FabricResult};
pub use mutation::{MutationInstruction, MutationKind, MutationList};
pub use node::{LayoutMetrics, Props, ShadowNode};
pub use tree::{ShadowTree, ShadowTreeRegistry, SurfaceState, ROOT_COMPONENT};
