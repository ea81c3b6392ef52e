//! Shadow nodes
//!
//! A `ShadowNode` is an immutable description of one UI element. Children
//! are held behind `Arc`, so cloning a node with one changed prop shares
//! every untouched subtree with the previous revision.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use weft_core::{Tag, Value};

/// Props of one node, ordered by name
pub type Props = BTreeMap<String, Value>;

/// Computed frame of a node, relative to its parent
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LayoutMetrics {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl LayoutMetrics {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Frame as an event payload (`{x, y, width, height}`)
    pub fn to_value(&self) -> Value {
        [
            ("x", self.x),
            ("y", self.y),
            ("width", self.width),
            ("height", self.height),
        ]
        .into_iter()
        .collect()
    }
}

/// Immutable node of a shadow tree
#[derive(Debug, Clone)]
pub struct ShadowNode {
    tag: Tag,
    component: Arc<str>,
    props: Arc<Props>,
    layout: LayoutMetrics,
    children: Arc<[Arc<ShadowNode>]>,
}

impl ShadowNode {
    /// Leaf node with no props and a zero frame
    pub fn new(tag: impl Into<Tag>, component: &str) -> Self {
        Self {
            tag: tag.into(),
            component: Arc::from(component),
            props: Arc::new(Props::new()),
            layout: LayoutMetrics::default(),
            children: Arc::from(Vec::new()),
        }
    }

    pub fn with_prop(mut self, key: &str, value: impl Into<Value>) -> Self {
        Arc::make_mut(&mut self.props).insert(key.to_string(), value.into());
        self
    }

    pub fn with_props(mut self, props: Props) -> Self {
        self.props = Arc::new(props);
        self
    }

    pub fn with_layout(mut self, layout: LayoutMetrics) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_children(mut self, children: Vec<Arc<ShadowNode>>) -> Self {
        self.children = Arc::from(children);
        self
    }

    /// Finish building and share
    pub fn into_shared(self) -> Arc<ShadowNode> {
        Arc::new(self)
    }

    /// Copy of this node with new props; children are shared
    pub fn clone_with_props(&self, props: Props) -> Self {
        self.clone().with_props(props)
    }

    /// Copy of this node with a new frame; props and children are shared
    pub fn clone_with_layout(&self, layout: LayoutMetrics) -> Self {
        self.clone().with_layout(layout)
    }

    /// Copy of this node with new children; props are shared
    pub fn clone_with_children(&self, children: Vec<Arc<ShadowNode>>) -> Self {
        self.clone().with_children(children)
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn prop(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    pub fn layout(&self) -> LayoutMetrics {
        self.layout
    }

    pub fn children(&self) -> &[Arc<ShadowNode>] {
        &self.children
    }

    /// Whether props or layout differ (children are not compared)
    pub fn differs_in_content(&self, other: &ShadowNode) -> bool {
        self.layout != other.layout
            || !(Arc::ptr_eq(&self.props, &other.props) || self.props == other.props)
    }

    /// Number of nodes in this subtree, including this one
    pub fn subtree_size(&self) -> usize {
        1 + self.children.iter().map(|c| c.subtree_size()).sum::<usize>()
    }

    /// Find a node by tag in this subtree
    pub fn find(&self, tag: Tag) -> Option<&ShadowNode> {
        if self.tag == tag {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(tag))
    }
}

impl PartialEq for ShadowNode {
    /// Value equality of the whole subtree; shared `Arc`s compare in O(1)
    fn eq(&self, other: &Self) -> bool {
        self.tag == other.tag
            && self.component == other.component
            && !self.differs_in_content(other)
            && (Arc::ptr_eq(&self.children, &other.children)
                || (self.children.len() == other.children.len()
                    && self
                        .children
                        .iter()
                        .zip(other.children.iter())
                        .all(|(a, b)| Arc::ptr_eq(a, b) || a == b)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_and_accessors() {
        let node = ShadowNode::new(5u32, "View")
            .with_prop("opacity", 0.5)
            .with_layout(LayoutMetrics::new(0.0, 0.0, 10.0, 20.0))
            .with_children(vec![ShadowNode::new(6u32, "Text").into_shared()]);

        assert_eq!(node.tag(), Tag::new(5));
        assert_eq!(node.component(), "View");
        assert_eq!(node.prop("opacity"), Some(&Value::from(0.5)));
        assert_eq!(node.layout().height, 20.0);
        assert_eq!(node.subtree_size(), 2);
        assert!(node.find(Tag::new(6)).is_some());
    }

    #[test]
    fn test_clone_with_props_shares_children() {
        let child = ShadowNode::new(2u32, "Text").into_shared();
        let parent = ShadowNode::new(1u32, "View").with_children(vec![Arc::clone(&child)]);

        let updated = parent.clone_with_props(Props::from([("a".to_string(), Value::from(1))]));
        assert!(Arc::ptr_eq(&updated.children()[0], &child));
        assert!(updated.differs_in_content(&parent));
        assert_ne!(updated, parent);
    }

    #[test]
    fn test_value_equality_ignores_identity() {
        let a = ShadowNode::new(1u32, "View").with_prop("x", 1);
        let b = ShadowNode::new(1u32, "View").with_prop("x", 1);
        assert_eq!(a, b);
        assert!(!a.differs_in_content(&b));
    }

    #[test]
    fn test_layout_payload() {
        let payload = LayoutMetrics::new(1.0, 2.0, 3.0, 4.0).to_value();
        assert_eq!(payload.get("width"), Some(&Value::from(3.0)));
    }
}
