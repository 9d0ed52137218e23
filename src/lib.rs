pub mod backend;
pub mod error;
pub mod geometry;
pub mod layout;
pub mod render_stats;
pub mod renderer;

use renderer::{Color, FilterMode};

pub mod prelude {
    pub use crate::error::{DeviceError, LayoutError};
    pub use crate::geometry::{Mat4, Point, Rect, Size, Vec4};
    pub use crate::layout::{
        FixedSize, LayoutHost, LayoutNode, LayoutTree, NodeId, Orientation, StackLayout,
    };
    pub use crate::renderer::{
        BatchManager, Canvas, Color, CompositeOperation, Compositor, ContentProvider, FilterMode,
        RecordingDevice, RenderBucket, RenderDevice, TextureHandle,
    };
    pub use crate::SceneConfig;

    #[cfg(feature = "wgpu")]
    pub use crate::backend::WgpuDevice;
}

/// Settings shared by the compositor and device backends.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneConfig {
    /// Filter used for bucket textures created by the compositor
    pub filter_mode: FilterMode,
    /// Color a screen target is cleared to before compositing
    pub clear_color: Color,
    /// Batches reserved up front for each composed frame
    pub initial_batch_capacity: usize,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            filter_mode: FilterMode::Linear,
            clear_color: Color::TRANSPARENT,
            initial_batch_capacity: 16,
        }
    }
}

impl SceneConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter_mode(mut self, filter_mode: FilterMode) -> Self {
        self.filter_mode = filter_mode;
        self
    }

    pub fn clear_color(mut self, color: Color) -> Self {
        self.clear_color = color;
        self
    }

    pub fn initial_batch_capacity(mut self, capacity: usize) -> Self {
        self.initial_batch_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_config_builder() {
        let config = SceneConfig::new()
            .filter_mode(FilterMode::Nearest)
            .clear_color(Color::BLACK)
            .initial_batch_capacity(4);
        assert_eq!(config.filter_mode, FilterMode::Nearest);
        assert_eq!(config.clear_color, Color::BLACK);
        assert_eq!(config.initial_batch_capacity, 4);
        assert_eq!(SceneConfig::default().initial_batch_capacity, 16);
    }
}
