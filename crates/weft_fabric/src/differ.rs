//! Differencing engine
//!
//! Compares two immutable trees by tag and emits the instructions that
//! turn the old one into the new one. Instructions are grouped by kind and
//! emitted in this order:
//!
//! ```text
//!   Remove*  ──►  Delete*  ──►  Create*  ──►  Update*  ──►  Insert*
//!   (old preorder,   (old post-     (new preorder)          (new preorder,
//!    descending       order)                                 ascending index
//!    index)                                                  per parent)
//! ```
//!
//! Applying the removes first leaves every surviving parent with only the
//! children that keep their relative order; inserts at ascending indices
//! then rebuild each child list exactly.
//!
//! Children are matched by tag. For each parent present in both trees the
//! children that stay under it keep the longest run that is already in
//! order; every other child is removed and re-inserted. A node that moves
//! to another parent keeps its tag and view and only yields Remove + Insert.
//! A subtree equal to its committed counterpart is skipped entirely.

use crate::error::{FabricError, FabricResult};
use crate::mutation::MutationInstruction;
use crate::node::ShadowNode;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use weft_core::Tag;

struct Placement<'a> {
    node: &'a Arc<ShadowNode>,
    parent: Option<Tag>,
    index: usize,
}

type TreeIndex<'a> = HashMap<Tag, Placement<'a>>;

/// Index a tree by tag. Fails on a tag that appears twice.
fn index_tree(root: &Arc<ShadowNode>) -> FabricResult<TreeIndex<'_>> {
    let mut index = HashMap::new();
    let mut stack = vec![(root, None, 0usize)];

    while let Some((node, parent, position)) = stack.pop() {
        let placement = Placement {
            node,
            parent,
            index: position,
        };
        if index.insert(node.tag(), placement).is_some() {
            return Err(FabricError::MalformedTree(format!(
                "duplicate tag {}",
                node.tag()
            )));
        }
        for (i, child) in node.children().iter().enumerate() {
            stack.push((child, Some(node.tag()), i));
        }
    }

    Ok(index)
}

#[derive(Default)]
struct Phases {
    removes: Vec<MutationInstruction>,
    deletes: Vec<MutationInstruction>,
    creates: Vec<MutationInstruction>,
    updates: Vec<MutationInstruction>,
    inserts: Vec<MutationInstruction>,
}

impl Phases {
    fn into_instructions(self) -> Vec<MutationInstruction> {
        let mut out = self.removes;
        out.extend(self.deletes);
        out.extend(self.creates);
        out.extend(self.updates);
        out.extend(self.inserts);
        out
    }
}

struct Differ<'a> {
    old: &'a TreeIndex<'a>,
    new: &'a TreeIndex<'a>,
}

impl<'a> Differ<'a> {
    /// Both trees hold an equal node under this tag
    fn is_unchanged(&self, tag: Tag) -> bool {
        match (self.old.get(&tag), self.new.get(&tag)) {
            (Some(old), Some(new)) => Arc::ptr_eq(old.node, new.node) || old.node == new.node,
            _ => false,
        }
    }

    /// Children of `parent` that stay under it without being moved
    fn kept_children(&self, parent: &ShadowNode) -> HashSet<Tag> {
        let candidates: Vec<(Tag, usize)> = parent
            .children()
            .iter()
            .filter_map(|child| {
                self.old
                    .get(&child.tag())
                    .filter(|p| p.parent == Some(parent.tag()))
                    .map(|p| (child.tag(), p.index))
            })
            .collect();

        let positions: Vec<usize> = candidates.iter().map(|(_, index)| *index).collect();
        longest_increasing_subsequence(&positions)
            .into_iter()
            .map(|i| candidates[i].0)
            .collect()
    }

    fn collect_removes(&self, node: &Arc<ShadowNode>, out: &mut Vec<MutationInstruction>) {
        if self.is_unchanged(node.tag()) {
            return;
        }

        let kept = match self.new.get(&node.tag()) {
            Some(survivor) => self.kept_children(survivor.node),
            None => HashSet::new(),
        };

        for (index, child) in node.children().iter().enumerate().rev() {
            if !kept.contains(&child.tag()) {
                out.push(MutationInstruction::Remove {
                    parent: node.tag(),
                    child: child.tag(),
                    index,
                });
            }
        }

        for child in node.children() {
            self.collect_removes(child, out);
        }
    }

    fn collect_deletes(&self, node: &Arc<ShadowNode>, out: &mut Vec<MutationInstruction>) {
        if self.is_unchanged(node.tag()) {
            return;
        }
        for child in node.children() {
            self.collect_deletes(child, out);
        }
        if !self.new.contains_key(&node.tag()) {
            out.push(MutationInstruction::Delete { tag: node.tag() });
        }
    }

    fn collect_new_side(&self, node: &Arc<ShadowNode>, phases: &mut Phases) -> FabricResult<()> {
        let kept = match self.old.get(&node.tag()) {
            Some(previous) => {
                if previous.node.component() != node.component() {
                    return Err(FabricError::ComponentChanged {
                        tag: node.tag(),
                        from: previous.node.component().to_string(),
                        to: node.component().to_string(),
                    });
                }
                if self.is_unchanged(node.tag()) {
                    return Ok(());
                }
                if node.differs_in_content(previous.node) {
                    phases.updates.push(MutationInstruction::Update {
                        tag: node.tag(),
                        props: node.props().clone(),
                        layout: node.layout(),
                    });
                }
                self.kept_children(node)
            }
            None => {
                phases.creates.push(MutationInstruction::Create {
                    tag: node.tag(),
                    component: node.component().to_string(),
                    props: node.props().clone(),
                    layout: node.layout(),
                });
                HashSet::new()
            }
        };

        for (index, child) in node.children().iter().enumerate() {
            if !kept.contains(&child.tag()) {
                phases.inserts.push(MutationInstruction::Insert {
                    parent: node.tag(),
                    child: child.tag(),
                    index,
                });
            }
        }

        for child in node.children() {
            self.collect_new_side(child, phases)?;
        }
        Ok(())
    }
}

/// Compute the instructions turning `old` into `new`.
///
/// With no old tree every node is created and attached, root included
/// (the root itself is never inserted). Fails without emitting anything on
/// duplicate tags, a changed root tag, or a tag whose component changed.
pub fn diff(
    old: Option<&Arc<ShadowNode>>,
    new: &Arc<ShadowNode>,
) -> FabricResult<Vec<MutationInstruction>> {
    let new_index = index_tree(new)?;
    let empty = TreeIndex::new();

    let Some(old) = old else {
        let differ = Differ {
            old: &empty,
            new: &new_index,
        };
        let mut phases = Phases::default();
        differ.collect_new_side(new, &mut phases)?;
        return Ok(phases.into_instructions());
    };

    if old.tag() != new.tag() {
        return Err(FabricError::MalformedTree(format!(
            "root tag changed from {} to {}",
            old.tag(),
            new.tag()
        )));
    }
    if Arc::ptr_eq(old, new) {
        return Ok(Vec::new());
    }

    let old_index = index_tree(old)?;
    let differ = Differ {
        old: &old_index,
        new: &new_index,
    };

    let mut phases = Phases::default();
    differ.collect_new_side(new, &mut phases)?;
    differ.collect_removes(old, &mut phases.removes);
    differ.collect_deletes(old, &mut phases.deletes);

    Ok(phases.into_instructions())
}

/// Instructions that unmount a whole tree: every child is removed, then
/// every node is deleted children first, the root last.
pub fn teardown(root: &Arc<ShadowNode>) -> Vec<MutationInstruction> {
    let empty = TreeIndex::new();
    let old_index = match index_tree(root) {
        Ok(index) => index,
        Err(_) => TreeIndex::new(),
    };
    let differ = Differ {
        old: &old_index,
        new: &empty,
    };

    let mut phases = Phases::default();
    differ.collect_removes(root, &mut phases.removes);
    differ.collect_deletes(root, &mut phases.deletes);
    phases.into_instructions()
}

/// Indices (into `seq`) of one longest strictly increasing subsequence
fn longest_increasing_subsequence(seq: &[usize]) -> Vec<usize> {
    let mut tails: Vec<usize> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; seq.len()];

    for (i, &value) in seq.iter().enumerate() {
        let position = tails.partition_point(|&t| seq[t] < value);
        if position > 0 {
            previous[i] = Some(tails[position - 1]);
        }
        if position == tails.len() {
            tails.push(i);
        } else {
            tails[position] = i;
        }
    }

    let mut result = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        result.push(i);
        cursor = previous[i];
    }
    result.reverse();
    result
}
