//! Recorded draw commands.

use super::context::Context;
use super::device::TextureHandle;
use super::types::{Color, CompositeOperation};
use crate::geometry::{Mat4, Rect};

/// A single recorded drawing instruction.
///
/// Coordinates are in the bucket's local pixel space. Commands are
/// replayed in recording order against a bound [`Context`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Change the composite operation for the following draws.
    SetCompositeOperation(CompositeOperation),

    /// Fill a rectangle with a solid color.
    FillRect {
        rect: Rect,
        color: Color,
    },

    /// Draw a whole texture stretched over `rect`.
    DrawTexture {
        texture: TextureHandle,
        rect: Rect,
        /// Multiplied with the sampled texel
        tint: Color,
    },

    /// Replace the transform applied to the following draws.
    SetTransform(Mat4),
}

impl Command {
    pub fn execute(&self, context: &mut Context) {
        match self {
            Command::SetCompositeOperation(op) => context.set_composite_operation(*op),
            Command::FillRect { rect, color } => context.fill_rect(*rect, *color),
            Command::DrawTexture {
                texture,
                rect,
                tint,
            } => context.draw_texture(*texture, *rect, *tint),
            Command::SetTransform(transform) => context.set_transform(*transform),
        }
    }
}
