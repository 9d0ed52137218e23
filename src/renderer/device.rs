//! Contract between the renderer and a texture-backed device.
//!
//! The renderer never touches GPU objects directly. It asks a
//! [`RenderDevice`] for textures and hands it ordered [`Batch`]es to draw.

use std::collections::HashSet;

use super::batch::Batch;
use super::types::FilterMode;
use crate::error::DeviceError;

/// Device-issued texture. Identity is the id; width and height are carried
/// along so quads can be sized without asking the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle {
    pub id: u64,
    pub width: u32,
    pub height: u32,
}

pub trait RenderDevice {
    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        filter: FilterMode,
    ) -> Result<TextureHandle, DeviceError>;

    /// Release a texture. Freeing an unknown handle is ignored.
    fn free_texture(&mut self, texture: TextureHandle);

    /// Clear `target` to transparent.
    fn clear(&mut self, target: TextureHandle) -> Result<(), DeviceError>;

    /// Draw `batches` onto `target`, in order.
    fn submit(&mut self, target: TextureHandle, batches: &[Batch]) -> Result<(), DeviceError>;
}

/// A single call observed by [`RecordingDevice`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    Created(TextureHandle),
    Freed(TextureHandle),
    Cleared(TextureHandle),
    Submitted {
        target: TextureHandle,
        batches: Vec<Batch>,
    },
}

/// In-memory device that records every call.
///
/// Submitting to, or sampling from, a texture that was never created or has
/// already been freed fails with [`DeviceError::UnknownTexture`].
#[derive(Debug, Default)]
pub struct RecordingDevice {
    next_id: u64,
    live: HashSet<u64>,
    events: Vec<DeviceEvent>,
    fail_allocations: bool,
}

impl RecordingDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following `create_texture` fail.
    pub fn set_fail_allocations(&mut self, fail: bool) {
        self.fail_allocations = fail;
    }

    pub fn events(&self) -> &[DeviceEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<DeviceEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn is_live(&self, texture: TextureHandle) -> bool {
        self.live.contains(&texture.id)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn created(&self) -> Vec<TextureHandle> {
        self.events
            .iter()
            .filter_map(|e| match e {
                DeviceEvent::Created(t) => Some(*t),
                _ => None,
            })
            .collect()
    }

    pub fn freed(&self) -> Vec<TextureHandle> {
        self.events
            .iter()
            .filter_map(|e| match e {
                DeviceEvent::Freed(t) => Some(*t),
                _ => None,
            })
            .collect()
    }

    /// Submissions in order, as `(target, batches)`.
    pub fn submissions(&self) -> Vec<(TextureHandle, &[Batch])> {
        self.events
            .iter()
            .filter_map(|e| match e {
                DeviceEvent::Submitted { target, batches } => Some((*target, batches.as_slice())),
                _ => None,
            })
            .collect()
    }

    fn check_live(&self, texture: TextureHandle) -> Result<(), DeviceError> {
        if self.live.contains(&texture.id) {
            Ok(())
        } else {
            Err(DeviceError::UnknownTexture(texture.id))
        }
    }
}

impl RenderDevice for RecordingDevice {
    fn create_texture(
        &mut self,
        width: u32,
        height: u32,
        _filter: FilterMode,
    ) -> Result<TextureHandle, DeviceError> {
        if self.fail_allocations {
            return Err(DeviceError::TextureAllocation {
                width,
                height,
                reason: "allocation disabled".to_string(),
            });
        }

        self.next_id += 1;
        let texture = TextureHandle {
            id: self.next_id,
            width,
            height,
        };
        self.live.insert(texture.id);
        self.events.push(DeviceEvent::Created(texture));
        Ok(texture)
    }

    fn free_texture(&mut self, texture: TextureHandle) {
        if self.live.remove(&texture.id) {
            self.events.push(DeviceEvent::Freed(texture));
        } else {
            log::warn!("free of unknown texture {}", texture.id);
        }
    }

    fn clear(&mut self, target: TextureHandle) -> Result<(), DeviceError> {
        self.check_live(target)?;
        self.events.push(DeviceEvent::Cleared(target));
        Ok(())
    }

    fn submit(&mut self, target: TextureHandle, batches: &[Batch]) -> Result<(), DeviceError> {
        self.check_live(target)?;
        for texture in batches.iter().filter_map(|b| b.texture()) {
            self.check_live(texture)?;
        }
        self.events.push(DeviceEvent::Submitted {
            target,
            batches: batches.to_vec(),
        });
        Ok(())
    }
}
