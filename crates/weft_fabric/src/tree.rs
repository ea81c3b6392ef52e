//! Per-surface shadow trees
//!
//! Each surface walks `NotStarted → Started → (Committing ⇄ Committed) → Stopped`.
//! A failed commit leaves the last committed tree and state in place.
//!
//! Tags share one namespace across surfaces: a tag live on one running
//! surface cannot appear in another surface's tree until the owning
//! surface drops it or stops.

use crate::differ::{diff, teardown};
use crate::error::{FabricError, FabricResult};
use crate::mutation::MutationList;
use crate::node::{Props, ShadowNode};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use weft_core::{SurfaceId, Tag};

/// Component name of every surface root node
pub const ROOT_COMPONENT: &str = "RootView";

/// Lifecycle of one surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceState {
    NotStarted,
    Started,
    Committing,
    Committed,
    Stopped,
}

impl SurfaceState {
    /// Whether commits are accepted
    pub fn accepts_commits(&self) -> bool {
        matches!(self, Self::Started | Self::Committed)
    }
}

/// The committed tree of one surface
#[derive(Debug, Clone)]
pub struct ShadowTree {
    surface_id: SurfaceId,
    state: SurfaceState,
    root: Arc<ShadowNode>,
    revision: u64,
    tags: HashSet<Tag>,
}

impl ShadowTree {
    pub fn surface_id(&self) -> SurfaceId {
        self.surface_id
    }

    pub fn state(&self) -> SurfaceState {
        self.state
    }

    pub fn root(&self) -> &Arc<ShadowNode> {
        &self.root
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Every tag of the committed tree
    pub fn tags(&self) -> &HashSet<Tag> {
        &self.tags
    }
}

/// Shadow trees of every surface, keyed by surface id
#[derive(Debug, Default)]
pub struct ShadowTreeRegistry {
    trees: HashMap<SurfaceId, ShadowTree>,
    /// Surface owning each live tag
    owners: HashMap<Tag, SurfaceId>,
}

impl ShadowTreeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the surface with an empty root carrying `initial_props`.
    ///
    /// Returns the revision 0 list that mounts the root view. A stopped
    /// surface may be started again.
    pub fn start_surface(
        &mut self,
        surface_id: SurfaceId,
        initial_props: Props,
    ) -> FabricResult<MutationList> {
        if let Some(existing) = self.trees.get(&surface_id) {
            if existing.state != SurfaceState::Stopped {
                return Err(FabricError::SurfaceAlreadyStarted(surface_id));
            }
        }

        let root = ShadowNode::new(surface_id.root_tag(), ROOT_COMPONENT)
            .with_props(initial_props)
            .into_shared();
        let tags = collect_tags(&root);
        self.check_ownership(surface_id, &tags)?;
        let instructions = diff(None, &root)?;

        self.claim(surface_id, &HashSet::new(), &tags);
        self.trees.insert(
            surface_id,
            ShadowTree {
                surface_id,
                state: SurfaceState::Started,
                root,
                revision: 0,
                tags,
            },
        );
        log::debug!("Started {}", surface_id);

        Ok(MutationList::new(surface_id, 0, instructions))
    }

    /// Diff `new_root` against the committed tree and make it authoritative.
    ///
    /// The root must keep the surface's root tag, and no tag may be live
    /// on another surface. On failure nothing is emitted and the previous
    /// tree stays committed.
    pub fn commit(
        &mut self,
        surface_id: SurfaceId,
        new_root: Arc<ShadowNode>,
    ) -> FabricResult<MutationList> {
        let state = self
            .trees
            .get(&surface_id)
            .map(|t| t.state)
            .ok_or(FabricError::SurfaceNotFound(surface_id))?;

        if !state.accepts_commits() {
            return Err(FabricError::SurfaceStopped(surface_id));
        }
        if new_root.tag() != surface_id.root_tag() {
            return Err(FabricError::MalformedTree(format!(
                "root of {} must have tag {}, got {}",
                surface_id,
                surface_id.root_tag(),
                new_root.tag()
            )));
        }
        let tags = collect_tags(&new_root);
        if let Err(error) = self.check_ownership(surface_id, &tags) {
            log::warn!("Rejected commit on {}: {}", surface_id, error);
            return Err(error);
        }

        let tree = self
            .trees
            .get_mut(&surface_id)
            .ok_or(FabricError::SurfaceNotFound(surface_id))?;
        let previous_state = tree.state;
        tree.state = SurfaceState::Committing;

        match diff(Some(&tree.root), &new_root) {
            Ok(instructions) => {
                let released = std::mem::replace(&mut tree.tags, tags);
                tree.root = new_root;
                tree.revision += 1;
                tree.state = SurfaceState::Committed;
                let revision = tree.revision;
                let claimed = tree.tags.clone();
                self.claim(surface_id, &released, &claimed);
                log::debug!(
                    "Committed {} revision {} ({} mutations)",
                    surface_id,
                    revision,
                    instructions.len()
                );
                Ok(MutationList::new(surface_id, revision, instructions))
            }
            Err(error) => {
                tree.state = previous_state;
                log::warn!("Rejected commit on {}: {}", surface_id, error);
                Err(error)
            }
        }
    }

    /// Stop the surface, returning the list that unmounts its whole tree
    pub fn stop_surface(&mut self, surface_id: SurfaceId) -> FabricResult<MutationList> {
        let tree = self
            .trees
            .get_mut(&surface_id)
            .ok_or(FabricError::SurfaceNotFound(surface_id))?;

        if tree.state == SurfaceState::Stopped {
            return Err(FabricError::SurfaceStopped(surface_id));
        }

        let instructions = teardown(&tree.root);
        tree.state = SurfaceState::Stopped;
        tree.revision += 1;
        let revision = tree.revision;
        let released = tree.tags.clone();
        self.claim(surface_id, &released, &HashSet::new());
        log::debug!("Stopped {}", surface_id);

        Ok(MutationList::new(surface_id, revision, instructions))
    }

    /// Put back the tree `surface_id` had before its last start or commit,
    /// for when the resulting list could not be mounted. `None` forgets
    /// the surface.
    pub fn revert(&mut self, surface_id: SurfaceId, previous: Option<ShadowTree>) {
        if let Some(current) = self.trees.remove(&surface_id) {
            self.claim(surface_id, &current.tags, &HashSet::new());
        }
        log::warn!("Reverting {} to its previous tree", surface_id);

        if let Some(tree) = previous {
            if tree.state != SurfaceState::Stopped {
                self.claim(surface_id, &HashSet::new(), &tree.tags);
            }
            self.trees.insert(surface_id, tree);
        }
    }

    /// Surface owning `tag`, if any running surface does
    pub fn owner_of(&self, tag: Tag) -> Option<SurfaceId> {
        self.owners.get(&tag).copied()
    }

    pub fn state(&self, surface_id: SurfaceId) -> SurfaceState {
        self.trees
            .get(&surface_id)
            .map(|t| t.state)
            .unwrap_or(SurfaceState::NotStarted)
    }

    pub fn committed_root(&self, surface_id: SurfaceId) -> Option<Arc<ShadowNode>> {
        self.trees.get(&surface_id).map(|t| Arc::clone(&t.root))
    }

    pub fn revision(&self, surface_id: SurfaceId) -> Option<u64> {
        self.trees.get(&surface_id).map(|t| t.revision)
    }

    pub fn tree(&self, surface_id: SurfaceId) -> Option<&ShadowTree> {
        self.trees.get(&surface_id)
    }

    /// Surfaces that are started and not stopped
    pub fn running_surfaces(&self) -> Vec<SurfaceId> {
        let mut ids: Vec<SurfaceId> = self
            .trees
            .values()
            .filter(|t| t.state != SurfaceState::Stopped)
            .map(|t| t.surface_id)
            .collect();
        ids.sort();
        ids
    }

    fn check_ownership(&self, surface_id: SurfaceId, tags: &HashSet<Tag>) -> FabricResult<()> {
        for tag in tags {
            match self.owners.get(tag) {
                Some(&owner) if owner != surface_id => {
                    return Err(FabricError::MalformedTree(format!(
                        "tag {} is live on {}",
                        tag, owner
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Move ownership of `surface_id` from `released` to `claimed`
    fn claim(&mut self, surface_id: SurfaceId, released: &HashSet<Tag>, claimed: &HashSet<Tag>) {
        for tag in released.difference(claimed) {
            if self.owners.get(tag) == Some(&surface_id) {
                self.owners.remove(tag);
            }
        }
        for tag in claimed {
            self.owners.insert(*tag, surface_id);
        }
    }
}

fn collect_tags(root: &Arc<ShadowNode>) -> HashSet<Tag> {
    let mut tags = HashSet::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        tags.insert(node.tag());
        stack.extend(node.children());
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::{MutationInstruction, MutationKind};

    const SURFACE: SurfaceId = SurfaceId::new(1);

    fn root_with(children: Vec<Arc<ShadowNode>>) -> Arc<ShadowNode> {
        ShadowNode::new(SURFACE.root_tag(), ROOT_COMPONENT)
            .with_children(children)
            .into_shared()
    }

    #[test]
    fn test_surface_lifecycle() {
        let mut registry = ShadowTreeRegistry::new();
        assert_eq!(registry.state(SURFACE), SurfaceState::NotStarted);

        let initial = registry.start_surface(SURFACE, Props::new()).unwrap();
        assert_eq!(initial.revision, 0);
        assert_eq!(initial.count(MutationKind::Create), 1);
        assert_eq!(registry.state(SURFACE), SurfaceState::Started);

        let list = registry
            .commit(SURFACE, root_with(vec![ShadowNode::new(10u32, "View").into_shared()]))
            .unwrap();
        assert_eq!(list.revision, 1);
        assert_eq!(registry.state(SURFACE), SurfaceState::Committed);

        let stop = registry.stop_surface(SURFACE).unwrap();
        assert_eq!(
            stop.instructions.last(),
            Some(&MutationInstruction::Delete { tag: SURFACE.root_tag() })
        );
        assert_eq!(registry.state(SURFACE), SurfaceState::Stopped);
        assert!(matches!(
            registry.commit(SURFACE, root_with(vec![])),
            Err(FabricError::SurfaceStopped(_))
        ));
        assert!(registry.running_surfaces().is_empty());
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let mut registry = ShadowTreeRegistry::new();
        registry.start_surface(SURFACE, Props::new()).unwrap();
        assert!(matches!(
            registry.start_surface(SURFACE, Props::new()),
            Err(FabricError::SurfaceAlreadyStarted(_))
        ));
    }

    #[test]
    fn test_failed_commit_keeps_previous_tree() {
        let mut registry = ShadowTreeRegistry::new();
        registry.start_surface(SURFACE, Props::new()).unwrap();

        let good = root_with(vec![ShadowNode::new(10u32, "View").into_shared()]);
        registry.commit(SURFACE, Arc::clone(&good)).unwrap();

        let dup = ShadowNode::new(11u32, "View").into_shared();
        let bad = root_with(vec![Arc::clone(&dup), dup]);
        assert!(matches!(
            registry.commit(SURFACE, bad),
            Err(FabricError::MalformedTree(_))
        ));

        assert_eq!(registry.state(SURFACE), SurfaceState::Committed);
        assert_eq!(registry.revision(SURFACE), Some(1));
        assert!(Arc::ptr_eq(&registry.committed_root(SURFACE).unwrap(), &good));
    }

    #[test]
    fn test_commit_to_unknown_surface() {
        let mut registry = ShadowTreeRegistry::new();
        assert!(matches!(
            registry.commit(SurfaceId::new(5), root_with(vec![])),
            Err(FabricError::SurfaceNotFound(_))
        ));
    }

    #[test]
    fn test_wrong_root_tag_is_malformed() {
        let mut registry = ShadowTreeRegistry::new();
        registry.start_surface(SURFACE, Props::new()).unwrap();
        let foreign = ShadowNode::new(99u32, ROOT_COMPONENT).into_shared();
        assert!(matches!(
            registry.commit(SURFACE, foreign),
            Err(FabricError::MalformedTree(_))
        ));
    }

    fn surface_root(surface: SurfaceId, children: Vec<Arc<ShadowNode>>) -> Arc<ShadowNode> {
        ShadowNode::new(surface.root_tag(), ROOT_COMPONENT)
            .with_children(children)
            .into_shared()
    }

    #[test]
    fn test_tag_live_on_another_surface_is_malformed() {
        let other = SurfaceId::new(2);
        let mut registry = ShadowTreeRegistry::new();
        registry.start_surface(SURFACE, Props::new()).unwrap();
        registry.start_surface(other, Props::new()).unwrap();

        let shared = ShadowNode::new(50u32, "View").into_shared();
        registry.commit(SURFACE, root_with(vec![Arc::clone(&shared)])).unwrap();
        assert_eq!(registry.owner_of(Tag::new(50)), Some(SURFACE));

        let before = registry.committed_root(other).unwrap();
        assert!(matches!(
            registry.commit(other, surface_root(other, vec![shared])),
            Err(FabricError::MalformedTree(_))
        ));
        assert_eq!(registry.revision(other), Some(0));
        assert_eq!(registry.state(other), SurfaceState::Started);
        assert!(Arc::ptr_eq(&registry.committed_root(other).unwrap(), &before));
    }

    #[test]
    fn test_root_tag_in_use_blocks_start() {
        let mut registry = ShadowTreeRegistry::new();
        registry.start_surface(SURFACE, Props::new()).unwrap();
        registry
            .commit(SURFACE, root_with(vec![ShadowNode::new(2u32, "View").into_shared()]))
            .unwrap();

        assert!(matches!(
            registry.start_surface(SurfaceId::new(2), Props::new()),
            Err(FabricError::MalformedTree(_))
        ));
        assert_eq!(registry.state(SurfaceId::new(2)), SurfaceState::NotStarted);
    }

    #[test]
    fn test_dropped_and_stopped_tags_are_released() {
        let other = SurfaceId::new(2);
        let mut registry = ShadowTreeRegistry::new();
        registry.start_surface(SURFACE, Props::new()).unwrap();
        registry.start_surface(other, Props::new()).unwrap();

        registry
            .commit(SURFACE, root_with(vec![ShadowNode::new(50u32, "View").into_shared()]))
            .unwrap();
        registry.commit(SURFACE, root_with(vec![])).unwrap();
        assert_eq!(registry.owner_of(Tag::new(50)), None);

        registry
            .commit(other, surface_root(other, vec![ShadowNode::new(50u32, "View").into_shared()]))
            .unwrap();
        assert_eq!(registry.owner_of(Tag::new(50)), Some(other));

        registry.stop_surface(other).unwrap();
        assert_eq!(registry.owner_of(Tag::new(50)), None);
        assert_eq!(registry.owner_of(other.root_tag()), None);
        assert_eq!(registry.owner_of(SURFACE.root_tag()), Some(SURFACE));
    }

    #[test]
    fn test_revert_restores_previous_tree_and_tags() {
        let mut registry = ShadowTreeRegistry::new();
        registry.start_surface(SURFACE, Props::new()).unwrap();
        let good = root_with(vec![ShadowNode::new(10u32, "View").into_shared()]);
        registry.commit(SURFACE, Arc::clone(&good)).unwrap();

        let previous = registry.tree(SURFACE).cloned();
        registry
            .commit(SURFACE, root_with(vec![ShadowNode::new(11u32, "View").into_shared()]))
            .unwrap();
        registry.revert(SURFACE, previous);

        assert_eq!(registry.revision(SURFACE), Some(1));
        assert!(Arc::ptr_eq(&registry.committed_root(SURFACE).unwrap(), &good));
        assert_eq!(registry.owner_of(Tag::new(10)), Some(SURFACE));
        assert_eq!(registry.owner_of(Tag::new(11)), None);

        let other = SurfaceId::new(3);
        registry.start_surface(other, Props::new()).unwrap();
        registry.revert(other, None);
        assert_eq!(registry.state(other), SurfaceState::NotStarted);
        assert_eq!(registry.owner_of(other.root_tag()), None);
    }
}
