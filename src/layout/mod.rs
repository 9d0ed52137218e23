//! Two-phase measure/arrange layout protocol.
//!
//! A [`LayoutHost`] owns the node tree. Nodes are stateless logic over it:
//! each node only remembers its own [`NodeId`] (handed over by
//! [`LayoutNode::on_attach`]) and receives the host as a borrowed
//! `&mut dyn LayoutHost` for every pass.

pub mod stack;
pub mod tree;

pub use stack::StackLayout;
pub use tree::{FixedSize, LayoutTree, NodeId};

use crate::error::LayoutError;
use crate::geometry::{Rect, Size};

/// Direction in which a stack layout places its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

impl Orientation {
    pub const ALL: [Orientation; 2] = [Orientation::Horizontal, Orientation::Vertical];

    /// Extent of `size` along the stacking axis.
    pub fn along(self, size: Size) -> f32 {
        match self {
            Orientation::Horizontal => size.width,
            Orientation::Vertical => size.height,
        }
    }

    /// Extent of `size` across the stacking axis.
    pub fn cross(self, size: Size) -> f32 {
        match self {
            Orientation::Horizontal => size.height,
            Orientation::Vertical => size.width,
        }
    }

    /// Build a size from along/cross extents.
    pub fn compose(self, along: f32, cross: f32) -> Size {
        match self {
            Orientation::Horizontal => Size::new(along, cross),
            Orientation::Vertical => Size::new(cross, along),
        }
    }
}

/// Collaborator that owns the node tree and runs passes on behalf of nodes.
pub trait LayoutHost {
    /// Children of `node`, in layout order.
    fn direct_children(&self, node: NodeId) -> Vec<NodeId>;

    /// Measure `child` against `available` and remember the result as its
    /// desired size.
    fn measure(&mut self, child: NodeId, available: Size) -> Result<Size, LayoutError>;

    /// Desired size from the last measure of `child`.
    fn desired_size(&self, child: NodeId) -> Size;

    /// Place `child` at its final rectangle.
    fn arrange(&mut self, child: NodeId, rect: Rect) -> Result<(), LayoutError>;

    /// Notify the host that the arrangement of `node` changed.
    fn report_changed_arrangement(&mut self, node: NodeId);
}

/// A node taking part in measure/arrange passes.
pub trait LayoutNode {
    /// Bind the node to the handle its host assigned to it.
    fn on_attach(&mut self, id: NodeId);

    /// Compute the size this node would like to occupy within `available`.
    fn measure(&mut self, host: &mut dyn LayoutHost, available: Size) -> Result<Size, LayoutError>;

    /// Place this node's children inside `rect`.
    fn arrange(&mut self, host: &mut dyn LayoutHost, rect: Rect) -> Result<(), LayoutError>;
}
