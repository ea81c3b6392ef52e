//! Mounting configuration

use serde::Deserialize;

/// Behavior switches of the mounting layer
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Clamp out-of-range insert indices and locate misplaced removes
    /// instead of failing the batch. Every correction is logged.
    pub clamp_invalid_indices: bool,
    /// Emit `topLayout` when a view's frame changes
    pub emit_layout_events: bool,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            clamp_invalid_indices: false,
            emit_layout_events: true,
        }
    }
}
