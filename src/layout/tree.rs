//! Arena-based layout host.
//!
//! The tree owns every layout node using a sparse-set architecture with
//! generational indices. Nodes never hold references to each other; they
//! only keep the [`NodeId`] assigned on insertion.
//!
//! ## Key Features
//!
//! - **Generational Indices**: a stale [`NodeId`] pointing at a reused slot
//!   is detected instead of silently aliasing the new node.
//!
//! - **Dense Storage**: nodes are stored contiguously; removal uses
//!   swap-remove so the dense array never has holes.
//!
//! - **Layout Metadata**: each node keeps its parent, ordered children,
//!   desired size from the last measure and rect from the last arrange.
//!
//! - **Dirty Bubbling**: structural mutations mark the node and its
//!   ancestors as needing layout until the next pass.

use std::collections::HashSet;

use super::{LayoutHost, LayoutNode};
use crate::error::LayoutError;
use crate::geometry::{Point, Rect, Size};

/// Unique identifier for a node in a [`LayoutTree`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

impl NodeId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Combines generation (high bits) with index (low bits).
    pub fn as_u64(self) -> u64 {
        ((self.generation as u64) << 32) | (self.index as u64)
    }
}

/// Entry in the sparse map, pointing to a dense array slot.
struct SparseEntry {
    dense_index: usize,
    generation: u32,
}

struct Node {
    /// `None` only while the node is running its own measure/arrange.
    layout: Option<Box<dyn LayoutNode>>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    desired_size: Option<Size>,
    arranged_rect: Option<Rect>,
    is_dirty: bool,
    /// Back-pointer to sparse array index (for swap-remove fixup)
    sparse_index: u32,
}

/// Owner of a layout node tree, implementing [`LayoutHost`] for its nodes.
pub struct LayoutTree {
    dense: Vec<Node>,
    sparse: Vec<Option<SparseEntry>>,
    free_indices: Vec<u32>,
    changed_arrangements: Vec<NodeId>,
    changed_set: HashSet<NodeId>,
}

impl LayoutTree {
    pub fn new() -> Self {
        Self {
            dense: Vec::new(),
            sparse: Vec::new(),
            free_indices: Vec::new(),
            changed_arrangements: Vec::new(),
            changed_set: HashSet::new(),
        }
    }

    /// Store a node and attach it to this tree.
    ///
    /// Parent-child relationships are set separately via `append_child`.
    pub fn insert(&mut self, mut layout: Box<dyn LayoutNode>) -> NodeId {
        let (sparse_index, generation) = if let Some(idx) = self.free_indices.pop() {
            let old_gen = self.sparse[idx as usize]
                .as_ref()
                .map(|e| e.generation)
                .unwrap_or(0);
            (idx, old_gen.wrapping_add(1))
        } else {
            let idx = self.sparse.len() as u32;
            self.sparse.push(None);
            (idx, 0)
        };

        let id = NodeId::new(sparse_index, generation);
        layout.on_attach(id);

        let dense_index = self.dense.len();
        self.dense.push(Node {
            layout: Some(layout),
            parent: None,
            children: Vec::new(),
            desired_size: None,
            arranged_rect: None,
            is_dirty: true,
            sparse_index,
        });
        self.sparse[sparse_index as usize] = Some(SparseEntry {
            dense_index,
            generation,
        });

        id
    }

    /// Append `child` to the end of `parent`'s children.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), LayoutError> {
        let parent_dense = self.dense_index(parent)?;
        let child_dense = self.dense_index(child)?;

        let mut ancestor = Some(parent);
        while let Some(node) = ancestor {
            if node == child {
                return Err(LayoutError::Cycle { parent, child });
            }
            ancestor = self.parent(node);
        }

        if let Some(old_parent) = self.dense[child_dense].parent {
            if let Ok(old_dense) = self.dense_index(old_parent) {
                self.dense[old_dense].children.retain(|&c| c != child);
            }
        }

        self.dense[child_dense].parent = Some(parent);
        self.dense[parent_dense].children.push(child);
        self.mark_needs_layout(parent);
        Ok(())
    }

    /// Remove a node together with its whole subtree.
    pub fn remove(&mut self, id: NodeId) -> Result<(), LayoutError> {
        let dense_index = self.dense_index(id)?;

        if let Some(parent) = self.dense[dense_index].parent {
            if let Ok(parent_dense) = self.dense_index(parent) {
                self.dense[parent_dense].children.retain(|&c| c != id);
            }
            self.mark_needs_layout(parent);
        }

        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let Ok(dense_index) = self.dense_index(current) else {
                continue;
            };
            pending.extend(self.dense[dense_index].children.iter().copied());
            self.swap_remove(current, dense_index);
        }
        Ok(())
    }

    fn swap_remove(&mut self, id: NodeId, dense_index: usize) {
        let last_dense_index = self.dense.len() - 1;
        self.dense.swap_remove(dense_index);

        if dense_index != last_dense_index {
            let moved_sparse_idx = self.dense[dense_index].sparse_index;
            if let Some(ref mut entry) = self.sparse[moved_sparse_idx as usize] {
                entry.dense_index = dense_index;
            }
        }

        // Keep the generation around so the next allocation can bump it.
        self.sparse[id.index as usize] = Some(SparseEntry {
            dense_index: usize::MAX,
            generation: id.generation,
        });
        self.free_indices.push(id.index);
        self.changed_set.remove(&id);
        self.changed_arrangements.retain(|&c| c != id);
    }

    fn dense_index(&self, id: NodeId) -> Result<usize, LayoutError> {
        self.sparse
            .get(id.index as usize)
            .and_then(|e| e.as_ref())
            .filter(|e| e.generation == id.generation && e.dense_index != usize::MAX)
            .map(|e| e.dense_index)
            .ok_or(LayoutError::UnknownNode(id))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.dense_index(id).is_ok()
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.dense_index(id)
            .ok()
            .and_then(|idx| self.dense[idx].parent)
    }

    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Mark a node and all of its ancestors as needing layout.
    pub fn mark_needs_layout(&mut self, id: NodeId) {
        let mut current = Some(id);
        while let Some(node) = current {
            let Ok(idx) = self.dense_index(node) else {
                return;
            };
            if self.dense[idx].is_dirty && node != id {
                return;
            }
            self.dense[idx].is_dirty = true;
            current = self.dense[idx].parent;
        }
    }

    pub fn needs_layout(&self, id: NodeId) -> bool {
        self.dense_index(id)
            .map(|idx| self.dense[idx].is_dirty)
            .unwrap_or(false)
    }

    /// Rect assigned to `id` by its parent during the last arrange pass.
    pub fn arranged_rect(&self, id: NodeId) -> Option<Rect> {
        self.dense_index(id)
            .ok()
            .and_then(|idx| self.dense[idx].arranged_rect)
    }

    /// Nodes that reported a changed arrangement since the last call, in
    /// report order.
    pub fn take_changed_arrangements(&mut self) -> Vec<NodeId> {
        self.changed_set.clear();
        std::mem::take(&mut self.changed_arrangements)
    }

    /// Run a full measure + arrange pass from `root`.
    ///
    /// The root is arranged at the origin with the available size; unbounded
    /// components fall back to the root's desired size.
    pub fn layout(&mut self, root: NodeId, available: Size) -> Result<Size, LayoutError> {
        let desired = LayoutHost::measure(self, root, available)?;

        let final_size = Size::new(
            if available.width.is_finite() {
                available.width
            } else {
                desired.width
            },
            if available.height.is_finite() {
                available.height
            } else {
                desired.height
            },
        );
        LayoutHost::arrange(self, root, Rect::new(Point::ZERO, final_size))?;

        crate::render_stats::record_layout_pass();
        log::debug!(
            "layout pass from {:?}: desired {:?}, arranged {:?}",
            root,
            desired,
            final_size
        );
        Ok(desired)
    }

    /// Run `f` with the node's layout logic taken out of its slot, so the
    /// logic can borrow the whole tree as its host.
    fn with_layout_mut<R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut dyn LayoutNode, &mut LayoutTree) -> Result<R, LayoutError>,
    ) -> Result<R, LayoutError> {
        let dense_index = self.dense_index(id)?;
        let mut layout = self.dense[dense_index]
            .layout
            .take()
            .ok_or(LayoutError::UnknownNode(id))?;

        let result = f(&mut *layout, self);

        // The closure may have removed nodes; look the slot up again.
        if let Ok(idx) = self.dense_index(id) {
            self.dense[idx].layout = Some(layout);
        }
        result
    }
}

impl Default for LayoutTree {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutHost for LayoutTree {
    fn direct_children(&self, node: NodeId) -> Vec<NodeId> {
        self.dense_index(node)
            .map(|idx| self.dense[idx].children.clone())
            .unwrap_or_default()
    }

    fn measure(&mut self, child: NodeId, available: Size) -> Result<Size, LayoutError> {
        let size = self.with_layout_mut(child, |layout, tree| layout.measure(tree, available))?;
        let idx = self.dense_index(child)?;
        self.dense[idx].desired_size = Some(size);
        Ok(size)
    }

    fn desired_size(&self, child: NodeId) -> Size {
        self.dense_index(child)
            .ok()
            .and_then(|idx| self.dense[idx].desired_size)
            .unwrap_or(Size::ZERO)
    }

    fn arrange(&mut self, child: NodeId, rect: Rect) -> Result<(), LayoutError> {
        let idx = self.dense_index(child)?;
        self.dense[idx].arranged_rect = Some(rect);
        self.dense[idx].is_dirty = false;
        self.with_layout_mut(child, |layout, tree| layout.arrange(tree, rect))
    }

    fn report_changed_arrangement(&mut self, node: NodeId) {
        if self.changed_set.insert(node) {
            self.changed_arrangements.push(node);
        }
    }
}

/// Leaf node with a fixed preferred size.
#[derive(Debug, Clone)]
pub struct FixedSize {
    size: Size,
    id: Option<NodeId>,
}

impl FixedSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            size: Size::new(width, height),
            id: None,
        }
    }

    pub fn size(&self) -> Size {
        self.size
    }
}

impl LayoutNode for FixedSize {
    fn on_attach(&mut self, id: NodeId) {
        self.id = Some(id);
    }

    fn measure(&mut self, _host: &mut dyn LayoutHost, available: Size) -> Result<Size, LayoutError> {
        if available.is_invalid() {
            return Err(LayoutError::InvalidSize);
        }
        Ok(self.size)
    }

    fn arrange(&mut self, host: &mut dyn LayoutHost, _rect: Rect) -> Result<(), LayoutError> {
        let id = self.id.ok_or(LayoutError::NotAttached)?;
        host.report_changed_arrangement(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{Orientation, StackLayout};

    fn leaf(tree: &mut LayoutTree, width: f32, height: f32) -> NodeId {
        tree.insert(Box::new(FixedSize::new(width, height)))
    }

    #[test]
    fn test_tree_insert_remove() {
        let mut tree = LayoutTree::new();
        let id = leaf(&mut tree, 1.0, 1.0);
        assert!(tree.contains(id));
        assert_eq!(tree.len(), 1);

        tree.remove(id).unwrap();
        assert!(!tree.contains(id));
        assert!(tree.is_empty());
        assert_eq!(tree.remove(id), Err(LayoutError::UnknownNode(id)));
    }

    #[test]
    fn test_tree_generational_index() {
        let mut tree = LayoutTree::new();
        let id1 = leaf(&mut tree, 1.0, 1.0);
        tree.remove(id1).unwrap();

        let id2 = leaf(&mut tree, 1.0, 1.0);
        assert!(!tree.contains(id1));
        assert!(tree.contains(id2));
        assert_eq!(id1.index, id2.index);
        assert_ne!(id1.generation, id2.generation);
    }

    #[test]
    fn test_tree_swap_remove_fixup() {
        let mut tree = LayoutTree::new();
        let id1 = leaf(&mut tree, 1.0, 1.0);
        let id2 = leaf(&mut tree, 2.0, 2.0);
        let id3 = leaf(&mut tree, 3.0, 3.0);

        tree.remove(id1).unwrap();
        assert!(tree.contains(id2));
        assert!(tree.contains(id3));
        assert_eq!(
            LayoutHost::measure(&mut tree, id3, Size::INFINITE),
            Ok(Size::new(3.0, 3.0))
        );
    }

    #[test]
    fn test_remove_subtree_detaches_from_parent() {
        let mut tree = LayoutTree::new();
        let root = tree.insert(Box::new(StackLayout::vertical()));
        let inner = tree.insert(Box::new(StackLayout::horizontal()));
        let a = leaf(&mut tree, 1.0, 1.0);
        let b = leaf(&mut tree, 1.0, 1.0);
        tree.append_child(root, inner).unwrap();
        tree.append_child(inner, a).unwrap();
        tree.append_child(root, b).unwrap();

        tree.remove(inner).unwrap();
        assert!(!tree.contains(a));
        assert_eq!(tree.direct_children(root), vec![b]);
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn test_append_child_reparents() {
        let mut tree = LayoutTree::new();
        let first = tree.insert(Box::new(StackLayout::vertical()));
        let second = tree.insert(Box::new(StackLayout::vertical()));
        let child = leaf(&mut tree, 1.0, 1.0);

        tree.append_child(first, child).unwrap();
        tree.append_child(second, child).unwrap();
        assert!(tree.direct_children(first).is_empty());
        assert_eq!(tree.direct_children(second), vec![child]);
        assert_eq!(tree.parent(child), Some(second));
    }

    #[test]
    fn test_dirty_bubbles_until_layout() {
        let mut tree = LayoutTree::new();
        let root = tree.insert(Box::new(StackLayout::vertical()));
        let child = leaf(&mut tree, 5.0, 5.0);
        tree.append_child(root, child).unwrap();
        tree.layout(root, Size::new(10.0, 10.0)).unwrap();
        assert!(!tree.needs_layout(root));

        tree.mark_needs_layout(child);
        assert!(tree.needs_layout(child));
        assert!(tree.needs_layout(root));
    }

    #[test]
    fn test_append_child_rejects_cycles() {
        let mut tree = LayoutTree::new();
        let root = tree.insert(Box::new(StackLayout::vertical()));
        let inner = tree.insert(Box::new(StackLayout::vertical()));
        let leaf_id = leaf(&mut tree, 1.0, 1.0);
        tree.append_child(root, inner).unwrap();
        tree.append_child(inner, leaf_id).unwrap();

        assert_eq!(
            tree.append_child(inner, root),
            Err(LayoutError::Cycle {
                parent: inner,
                child: root
            })
        );
        assert_eq!(
            tree.append_child(inner, inner),
            Err(LayoutError::Cycle {
                parent: inner,
                child: inner
            })
        );

        // The tree is left untouched and still lays out
        assert_eq!(tree.parent(root), None);
        assert_eq!(tree.direct_children(inner), vec![leaf_id]);
        assert_eq!(tree.layout(root, Size::new(10.0, 10.0)), Ok(Size::new(1.0, 1.0)));
    }

    #[test]
    fn test_layout_only_cleans_visited_nodes() {
        let mut tree = LayoutTree::new();
        let laid_out = tree.insert(Box::new(StackLayout::vertical()));
        let child = leaf(&mut tree, 2.0, 2.0);
        tree.append_child(laid_out, child).unwrap();
        let detached = tree.insert(Box::new(StackLayout::horizontal()));

        tree.layout(laid_out, Size::new(10.0, 10.0)).unwrap();
        assert!(!tree.needs_layout(laid_out));
        assert!(!tree.needs_layout(child));
        assert!(tree.needs_layout(detached));
    }

    #[test]
    fn test_nested_stack_layout() {
        let mut tree = LayoutTree::new();
        let root = tree.insert(Box::new(StackLayout::new(Orientation::Vertical, true)));
        let row = tree.insert(Box::new(StackLayout::horizontal()));
        let a = leaf(&mut tree, 10.0, 5.0);
        let b = leaf(&mut tree, 20.0, 15.0);
        let footer = leaf(&mut tree, 30.0, 10.0);
        tree.append_child(row, a).unwrap();
        tree.append_child(row, b).unwrap();
        tree.append_child(root, row).unwrap();
        tree.append_child(root, footer).unwrap();

        let desired = tree.layout(root, Size::new(100.0, 100.0)).unwrap();
        assert_eq!(desired, Size::new(30.0, 25.0));

        assert_eq!(tree.arranged_rect(root), Some(Rect::from_xywh(0.0, 0.0, 100.0, 100.0)));
        assert_eq!(tree.arranged_rect(row), Some(Rect::from_xywh(0.0, 0.0, 100.0, 15.0)));
        assert_eq!(tree.arranged_rect(a), Some(Rect::from_xywh(0.0, 0.0, 10.0, 15.0)));
        assert_eq!(tree.arranged_rect(b), Some(Rect::from_xywh(10.0, 0.0, 20.0, 15.0)));
        assert_eq!(
            tree.arranged_rect(footer),
            Some(Rect::from_xywh(0.0, 15.0, 100.0, 85.0))
        );

        let changed = tree.take_changed_arrangements();
        assert_eq!(changed, vec![a, b, row, footer, root]);
        assert!(tree.take_changed_arrangements().is_empty());
    }

    #[test]
    fn test_layout_unbounded_uses_desired() {
        let mut tree = LayoutTree::new();
        let root = tree.insert(Box::new(StackLayout::horizontal()));
        let a = leaf(&mut tree, 10.0, 5.0);
        tree.append_child(root, a).unwrap();

        tree.layout(root, Size::INFINITE).unwrap();
        assert_eq!(tree.arranged_rect(root), Some(Rect::from_xywh(0.0, 0.0, 10.0, 5.0)));
    }

    #[test]
    fn test_layout_invalid_size() {
        let mut tree = LayoutTree::new();
        let root = tree.insert(Box::new(StackLayout::vertical()));
        assert_eq!(
            tree.layout(root, Size::INVALID),
            Err(LayoutError::InvalidSize)
        );
        assert_eq!(tree.arranged_rect(root), None);
    }

    #[test]
    fn test_desired_size_defaults_to_zero() {
        let mut tree = LayoutTree::new();
        let id = leaf(&mut tree, 4.0, 4.0);
        assert_eq!(tree.desired_size(id), Size::ZERO);
    }
}
