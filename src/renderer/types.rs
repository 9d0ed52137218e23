//! Shared types for the renderer.

/// RGBA color with premultiplication left to the device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn rgba(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    /// Opaque color from a `0xRRGGBB` value.
    pub const fn from_hex(hex: u32) -> Self {
        Self {
            r: ((hex >> 16) & 0xFF) as f32 / 255.0,
            g: ((hex >> 8) & 0xFF) as f32 / 255.0,
            b: (hex & 0xFF) as f32 / 255.0,
            a: 1.0,
        }
    }

    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const TRANSPARENT: Color = Color::rgba(0.0, 0.0, 0.0, 0.0);

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

impl Default for Color {
    fn default() -> Self {
        Self::TRANSPARENT
    }
}

/// Porter-Duff style operation used when drawing onto a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompositeOperation {
    Clear,
    Copy,
    #[default]
    SourceOver,
    SourceIn,
    SourceOut,
    SourceAtop,
    DestinationOver,
    DestinationIn,
    DestinationOut,
    DestinationAtop,
    Xor,
    Lighter,
    Multiply,
}

impl CompositeOperation {
    pub const ALL: [CompositeOperation; 13] = [
        CompositeOperation::Clear,
        CompositeOperation::Copy,
        CompositeOperation::SourceOver,
        CompositeOperation::SourceIn,
        CompositeOperation::SourceOut,
        CompositeOperation::SourceAtop,
        CompositeOperation::DestinationOver,
        CompositeOperation::DestinationIn,
        CompositeOperation::DestinationOut,
        CompositeOperation::DestinationAtop,
        CompositeOperation::Xor,
        CompositeOperation::Lighter,
        CompositeOperation::Multiply,
    ];
}

/// Sampling filter used when a texture is drawn scaled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}
