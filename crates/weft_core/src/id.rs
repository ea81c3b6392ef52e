//! Opaque identifiers shared across the bridge layers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one UI element.
///
/// The same tag names a shadow node and the native view mounted for it.
/// The mounting layer never hands out pointers to views, only tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag(u32);

impl Tag {
    /// Create a tag from its raw value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw tag value
    pub const fn raw(&self) -> u32 {
        self.0
    }
}

impl From<u32> for Tag {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a surface (one root UI tree)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SurfaceId(u32);

impl SurfaceId {
    /// Create a surface id from its raw value
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw value
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// The tag of the surface's root node.
    ///
    /// Root tags equal the surface id, so a surface's root view can be found
    /// without a lookup table.
    pub const fn root_tag(&self) -> Tag {
        Tag(self.0)
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface:{}", self.0)
    }
}

/// A script-side function handle, received as a numeric argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallbackId(u64);

impl CallbackId {
    /// Create a callback id from its raw value
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cb:{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_tag_matches_surface() {
        let surface = SurfaceId::new(11);
        assert_eq!(surface.root_tag(), Tag::new(11));
    }

    #[test]
    fn test_display() {
        assert_eq!(Tag::new(7).to_string(), "#7");
        assert_eq!(SurfaceId::new(1).to_string(), "surface:1");
    }
}
