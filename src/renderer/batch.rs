//! Draw-call batching.
//!
//! Quads are appended in painter's order. Consecutive quads that share a
//! composite operation and a texture end up in the same [`Batch`]; changing
//! either starts a new one. Batches are never reordered.

use super::device::TextureHandle;
use super::types::{Color, CompositeOperation};
use crate::geometry::{Mat4, Rect};

/// Vertex in target pixel space, as uploaded to the device.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    pub color: [f32; 4],
}

/// Four vertices: top-left, top-right, bottom-left, bottom-right.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Quad {
    pub vertices: [Vertex; 4],
}

impl Quad {
    /// Index pattern for two triangles covering a quad.
    pub const INDICES: [u16; 6] = [0, 1, 2, 1, 3, 2];

    fn new(rect: Rect, uv: Rect, transform: &Mat4, color: Color) -> Self {
        let corners = [
            (rect.x(), rect.y(), uv.x(), uv.y()),
            (rect.max_x(), rect.y(), uv.max_x(), uv.y()),
            (rect.x(), rect.max_y(), uv.x(), uv.max_y()),
            (rect.max_x(), rect.max_y(), uv.max_x(), uv.max_y()),
        ];
        let color = color.to_array();
        let vertices = corners.map(|(x, y, u, v)| {
            let p = transform.transform_point(x, y);
            Vertex {
                position: [p.x, p.y],
                uv: [u, v],
                color,
            }
        });
        Self { vertices }
    }
}

/// Quads drawn with one composite operation and at most one texture.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    operation: CompositeOperation,
    texture: Option<TextureHandle>,
    quads: Vec<Quad>,
}

impl Batch {
    pub fn operation(&self) -> CompositeOperation {
        self.operation
    }

    /// `None` for untextured (solid color) quads.
    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    pub fn quads(&self) -> &[Quad] {
        &self.quads
    }

    /// Raw vertex bytes, ready for a vertex buffer upload.
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.quads)
    }
}

#[derive(Debug, Default)]
pub struct BatchManager {
    batches: Vec<Batch>,
    operation: CompositeOperation,
}

impl BatchManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            batches: Vec::with_capacity(capacity),
            operation: CompositeOperation::default(),
        }
    }

    /// Use `op` for the following quads.
    pub fn add_change_composite_operation(&mut self, op: CompositeOperation) {
        self.operation = op;
    }

    pub fn current_operation(&self) -> CompositeOperation {
        self.operation
    }

    /// Quad covering the whole texture, `(0,0)-(width,height)`.
    pub fn add_texture_quad(&mut self, texture: TextureHandle, transform: &Mat4, tint: Color) {
        let rect = Rect::from_xywh(0.0, 0.0, texture.width as f32, texture.height as f32);
        self.add_texture_rect(texture, rect, transform, tint);
    }

    /// Whole texture stretched over `rect`.
    pub fn add_texture_rect(
        &mut self,
        texture: TextureHandle,
        rect: Rect,
        transform: &Mat4,
        tint: Color,
    ) {
        let quad = Quad::new(rect, Rect::from_xywh(0.0, 0.0, 1.0, 1.0), transform, tint);
        self.push(Some(texture), quad);
    }

    /// Untextured quad.
    pub fn add_color_quad(&mut self, rect: Rect, transform: &Mat4, color: Color) {
        let quad = Quad::new(rect, Rect::from_xywh(0.0, 0.0, 0.0, 0.0), transform, color);
        self.push(None, quad);
    }

    fn push(&mut self, texture: Option<TextureHandle>, quad: Quad) {
        let operation = self.operation;
        match self.batches.last_mut() {
            Some(batch) if batch.operation == operation && batch.texture == texture => {
                batch.quads.push(quad);
            }
            _ => {
                log::trace!(
                    "new batch #{} ({:?}, texture {:?})",
                    self.batches.len(),
                    operation,
                    texture.map(|t| t.id)
                );
                self.batches.push(Batch {
                    operation,
                    texture,
                    quads: vec![quad],
                });
            }
        }
    }

    pub fn batches(&self) -> &[Batch] {
        &self.batches
    }

    pub fn quad_count(&self) -> usize {
        self.batches.iter().map(|b| b.quads.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Drop all batches and go back to `SourceOver`.
    pub fn clear(&mut self) {
        self.batches.clear();
        self.operation = CompositeOperation::default();
    }
}
