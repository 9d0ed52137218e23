//! Cached render buckets and batched compositing.
//!
//! Content records [`Command`]s into a bucket's [`Canvas`]. Buckets replay
//! those commands into their own double-buffered [`Context`] only when
//! something changed, and the [`Compositor`] draws every bucket's texture as
//! a single quad in render order. All device work goes through the
//! [`RenderDevice`] trait.

pub mod batch;
pub mod bucket;
pub mod canvas;
pub mod commands;
pub mod compositor;
pub mod context;
pub mod device;
pub mod types;

pub use batch::{Batch, BatchManager, Quad, Vertex};
pub use bucket::{ContentChanges, RenderBucket};
pub use canvas::{Canvas, ContentProvider};
pub use commands::Command;
pub use compositor::Compositor;
pub use context::Context;
pub use device::{DeviceEvent, RecordingDevice, RenderDevice, TextureHandle};
pub use types::{Color, CompositeOperation, FilterMode};
