//! Double-buffered render target for one bucket.
//!
//! A context owns two device textures. Commands are replayed into the back
//! texture through a bound [`BatchManager`]; `flush` submits the batches and
//! swaps, so [`Context::texture`] always returns fully rendered content.

use super::batch::BatchManager;
use super::device::{RenderDevice, TextureHandle};
use super::types::{Color, CompositeOperation, FilterMode};
use crate::error::DeviceError;
use crate::geometry::{Mat4, Rect};

pub struct Context {
    front: TextureHandle,
    back: TextureHandle,
    filter: FilterMode,
    batch: Option<BatchManager>,
    operation: CompositeOperation,
    transform: Mat4,
    needs_clear: bool,
    freed: bool,
}

impl Context {
    pub fn new(
        device: &mut dyn RenderDevice,
        width: u32,
        height: u32,
        filter: FilterMode,
    ) -> Result<Self, DeviceError> {
        let front = device.create_texture(width, height, filter)?;
        let back = match device.create_texture(width, height, filter) {
            Ok(back) => back,
            Err(e) => {
                device.free_texture(front);
                return Err(e);
            }
        };
        crate::render_stats::record_context_allocated();
        log::debug!(
            "allocated {}x{} context (textures {}, {})",
            width,
            height,
            front.id,
            back.id
        );

        Ok(Self {
            front,
            back,
            filter,
            batch: None,
            operation: CompositeOperation::default(),
            transform: Mat4::IDENTITY,
            needs_clear: false,
            freed: false,
        })
    }

    /// Attach a batch manager for one recording session.
    pub fn bind(&mut self, batch: BatchManager) {
        self.batch = Some(batch);
    }

    pub fn is_bound(&self) -> bool {
        self.batch.is_some()
    }

    /// Reset replay state and schedule a clear of the back texture.
    pub fn prepare(&mut self) {
        self.operation = CompositeOperation::default();
        self.transform = Mat4::IDENTITY;
        self.needs_clear = true;
        if let Some(batch) = self.batch.as_mut() {
            batch.clear();
        }
    }

    pub fn set_composite_operation(&mut self, op: CompositeOperation) {
        self.operation = op;
    }

    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Color) {
        let (operation, transform) = (self.operation, self.transform);
        if let Some(batch) = self.bound_batch() {
            batch.add_change_composite_operation(operation);
            batch.add_color_quad(rect, &transform, color);
        }
    }

    pub fn draw_texture(&mut self, texture: TextureHandle, rect: Rect, tint: Color) {
        let (operation, transform) = (self.operation, self.transform);
        if let Some(batch) = self.bound_batch() {
            batch.add_change_composite_operation(operation);
            batch.add_texture_rect(texture, rect, &transform, tint);
        }
    }

    fn bound_batch(&mut self) -> Option<&mut BatchManager> {
        if self.batch.is_none() {
            log::warn!("draw on context {} without a bound batch manager", self.front.id);
        }
        self.batch.as_mut()
    }

    /// Submit recorded batches into the back texture, then swap.
    ///
    /// Returns the number of batches submitted and unbinds the batch manager.
    pub fn flush(&mut self, device: &mut dyn RenderDevice) -> Result<usize, DeviceError> {
        let Some(batch) = self.batch.take() else {
            return Ok(0);
        };

        if self.needs_clear {
            device.clear(self.back)?;
            self.needs_clear = false;
        }
        device.submit(self.back, batch.batches())?;
        crate::render_stats::record_submission(batch.batches().len(), batch.quad_count());

        std::mem::swap(&mut self.front, &mut self.back);
        Ok(batch.batches().len())
    }

    /// Texture holding the last flushed content.
    pub fn texture(&self) -> TextureHandle {
        self.front
    }

    pub fn width(&self) -> u32 {
        self.front.width
    }

    pub fn height(&self) -> u32 {
        self.front.height
    }

    pub fn filter(&self) -> FilterMode {
        self.filter
    }

    /// Release both textures.
    pub fn free(mut self, device: &mut dyn RenderDevice) {
        device.free_texture(self.front);
        device.free_texture(self.back);
        self.freed = true;
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        if !self.freed {
            log::warn!(
                "context dropped without free, leaking textures {} and {}",
                self.front.id,
                self.back.id
            );
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("front", &self.front)
            .field("back", &self.back)
            .field("bound", &self.batch.is_some())
            .finish()
    }
}
