//! Mutation instructions
//!
//! One commit yields one [`MutationList`]. The mounting layer consumes it
//! exactly once, in order.

use crate::node::{LayoutMetrics, Props};
use std::fmt;
use weft_core::{SurfaceId, Tag};

/// One atomic edit of the native view tree
#[derive(Debug, Clone, PartialEq)]
pub enum MutationInstruction {
    /// Instantiate a detached view
    Create {
        tag: Tag,
        component: String,
        props: Props,
        layout: LayoutMetrics,
    },
    /// Attach `child` under `parent` at `index`
    Insert { parent: Tag, child: Tag, index: usize },
    /// Detach `child`, currently at `index`, from `parent` without destroying it
    Remove { parent: Tag, child: Tag, index: usize },
    /// Release a detached, childless view
    Delete { tag: Tag },
    /// Apply a new props snapshot and frame to an existing view
    Update {
        tag: Tag,
        props: Props,
        layout: LayoutMetrics,
    },
}

/// Instruction kind, without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MutationKind {
    Remove,
    Delete,
    Create,
    Update,
    Insert,
}

impl MutationInstruction {
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::Create { .. } => MutationKind::Create,
            Self::Insert { .. } => MutationKind::Insert,
            Self::Remove { .. } => MutationKind::Remove,
            Self::Delete { .. } => MutationKind::Delete,
            Self::Update { .. } => MutationKind::Update,
        }
    }

    /// The view this instruction acts on (the child for Insert/Remove)
    pub fn tag(&self) -> Tag {
        match self {
            Self::Create { tag, .. } | Self::Delete { tag } | Self::Update { tag, .. } => *tag,
            Self::Insert { child, .. } | Self::Remove { child, .. } => *child,
        }
    }
}

impl fmt::Display for MutationInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create { tag, component, .. } => write!(f, "Create({tag}, {component})"),
            Self::Insert { parent, child, index } => write!(f, "Insert({parent} <- {child} @{index})"),
            Self::Remove { parent, child, index } => write!(f, "Remove({parent} -> {child} @{index})"),
            Self::Delete { tag } => write!(f, "Delete({tag})"),
            Self::Update { tag, .. } => write!(f, "Update({tag})"),
        }
    }
}

/// The ordered instructions of one commit
#[derive(Debug, Clone, PartialEq)]
pub struct MutationList {
    pub surface_id: SurfaceId,
    pub revision: u64,
    pub instructions: Vec<MutationInstruction>,
}

impl MutationList {
    pub fn new(surface_id: SurfaceId, revision: u64, instructions: Vec<MutationInstruction>) -> Self {
        Self {
            surface_id,
            revision,
            instructions,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MutationInstruction> {
        self.instructions.iter()
    }

    /// Number of instructions of `kind`
    pub fn count(&self, kind: MutationKind) -> usize {
        self.instructions.iter().filter(|i| i.kind() == kind).count()
    }
}

impl IntoIterator for MutationList {
    type Item = MutationInstruction;
    type IntoIter = std::vec::IntoIter<MutationInstruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.into_iter()
    }
}
