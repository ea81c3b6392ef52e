//! Fabric errors

use thiserror::Error;
use weft_core::{SurfaceId, Tag};

/// Errors from shadow tree commits
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FabricError {
    #[error("Malformed tree: {0}")]
    MalformedTree(String),

    #[error("Node {tag} changed component from {from} to {to}")]
    ComponentChanged { tag: Tag, from: String, to: String },

    #[error("Surface not found: {0}")]
    SurfaceNotFound(SurfaceId),

    #[error("Surface {0} is stopped")]
    SurfaceStopped(SurfaceId),

    #[error("Surface {0} is already started")]
    SurfaceAlreadyStarted(SurfaceId),
}

/// Result type for fabric operations
pub type FabricResult<T> = Result<T, FabricError>;
