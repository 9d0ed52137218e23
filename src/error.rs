//! Error types for layout passes and device collaborators.

use thiserror::Error;

use crate::layout::NodeId;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LayoutError {
    #[error("invalid available size passed to measure")]
    InvalidSize,

    #[error("layout node used before it was attached to a host")]
    NotAttached,

    #[error("unknown layout node: {0:?}")]
    UnknownNode(NodeId),

    #[error("appending {child:?} under {parent:?} would create a cycle")]
    Cycle { parent: NodeId, child: NodeId },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DeviceError {
    #[error("failed to allocate {width}x{height} texture: {reason}")]
    TextureAllocation {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("unknown texture: {0}")]
    UnknownTexture(u64),

    #[error("render backend error: {0}")]
    Backend(String),
}
