use super::{LayoutHost, LayoutNode, NodeId, Orientation};
use crate::error::LayoutError;
use crate::geometry::{Point, Rect, Size};

/// Stack layout: places children edge to edge along one axis.
///
/// Each child gets the full cross-axis extent of the arranged rect and its
/// own desired extent along the stacking axis. With `stretch_last` the final
/// child takes whatever along-axis space is left, which can be more or less
/// than it asked for.
#[derive(Debug, Clone)]
pub struct StackLayout {
    orientation: Orientation,
    stretch_last: bool,
    id: Option<NodeId>,
}

impl StackLayout {
    pub fn new(orientation: Orientation, stretch_last: bool) -> Self {
        Self {
            orientation,
            stretch_last,
            id: None,
        }
    }

    pub fn horizontal() -> Self {
        Self::new(Orientation::Horizontal, false)
    }

    pub fn vertical() -> Self {
        Self::new(Orientation::Vertical, false)
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Takes effect on the next measure/arrange pass.
    pub fn set_orientation(&mut self, orientation: Orientation) {
        self.orientation = orientation;
    }

    pub fn is_stretch_last(&self) -> bool {
        self.stretch_last
    }

    /// Takes effect on the next arrange pass.
    pub fn set_stretch_last(&mut self, stretch_last: bool) {
        self.stretch_last = stretch_last;
    }

    fn attached_id(&self) -> Result<NodeId, LayoutError> {
        self.id.ok_or(LayoutError::NotAttached)
    }

    fn position_at(&self, rect: Rect, offset: f32) -> Point {
        match self.orientation {
            Orientation::Horizontal => Point::new(rect.x() + offset, rect.y()),
            Orientation::Vertical => Point::new(rect.x(), rect.y() + offset),
        }
    }
}

impl Default for StackLayout {
    fn default() -> Self {
        Self::vertical()
    }
}

impl LayoutNode for StackLayout {
    fn on_attach(&mut self, id: NodeId) {
        self.id = Some(id);
    }

    fn measure(&mut self, host: &mut dyn LayoutHost, available: Size) -> Result<Size, LayoutError> {
        if available.is_invalid() {
            return Err(LayoutError::InvalidSize);
        }
        let id = self.attached_id()?;

        let children = host.direct_children(id);
        if children.is_empty() {
            return Ok(Size::ZERO);
        }

        let axis = self.orientation;
        let available_along = axis.along(available);
        let available_cross = axis.cross(available);

        let mut total_along = 0.0f32;
        let mut max_cross = 0.0f32;

        for child in children {
            // Not clamped: a host whose children overflow hands out negative extents.
            let remaining = axis.compose(available_along - total_along, available_cross);
            let size = host.measure(child, remaining)?;
            total_along += axis.along(size);
            max_cross = max_cross.max(axis.cross(size));
        }

        Ok(axis.compose(total_along, max_cross))
    }

    fn arrange(&mut self, host: &mut dyn LayoutHost, rect: Rect) -> Result<(), LayoutError> {
        let id = self.attached_id()?;
        let children = host.direct_children(id);

        let axis = self.orientation;
        let along = axis.along(rect.size);
        let cross = axis.cross(rect.size);
        let last = children.len().saturating_sub(1);

        let mut offset = 0.0f32;
        for (i, child) in children.into_iter().enumerate() {
            let desired = axis.along(host.desired_size(child));
            let extent = if self.stretch_last && i == last {
                along - offset
            } else {
                desired
            };

            let child_rect = Rect::new(self.position_at(rect, offset), axis.compose(extent, cross));
            host.arrange(child, child_rect)?;
            offset += desired;
        }

        host.report_changed_arrangement(id);
        Ok(())
    }
}
