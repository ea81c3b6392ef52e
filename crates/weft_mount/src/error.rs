//! Mounting errors
//!
//! Command failures (`UnknownCommand`, `CommandFailed`) leave the
//! hierarchy untouched. Every other variant signals an inconsistency
//! between the instruction stream and the live views, which the instance
//! treats as fatal.

use thiserror::Error;
use weft_core::{SurfaceId, Tag};
use weft_queue::QueueError;

/// Errors from the mounting layer
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MountError {
    #[error("No view manager for component {0}")]
    UnknownComponent(String),

    #[error("View manager already registered: {0}")]
    DuplicateManager(String),

    #[error("Unknown view {0}")]
    UnknownView(Tag),

    #[error("View {0} already exists")]
    DuplicateView(Tag),

    #[error("Insert into {parent} at {index} is out of range ({len} children)")]
    IndexOutOfRange { parent: Tag, index: usize, len: usize },

    #[error("{child} is not the child of {parent} at index {index}")]
    ChildMismatch { parent: Tag, child: Tag, index: usize },

    #[error("View {0} is still attached or has children")]
    StillAttached(Tag),

    #[error("Component {component} has no command {command}")]
    UnknownCommand { component: String, command: String },

    #[error("Command {command} failed on {tag}: {reason}")]
    CommandFailed { tag: Tag, command: String, reason: String },

    #[error("Prop {prop} rejected by {tag}: {reason}")]
    PropRejected { tag: Tag, prop: String, reason: String },

    #[error("Revision {revision} of {surface} arrived after revision {last}")]
    StaleRevision { surface: SurfaceId, revision: u64, last: u64 },

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

impl MountError {
    /// Whether the view hierarchy can no longer be trusted
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::UnknownCommand { .. } | Self::CommandFailed { .. })
    }
}

/// Result type for mounting operations
pub type MountResult<T> = Result<T, MountError>;
