//! Device backends.

#[cfg(feature = "wgpu")]
mod wgpu_device;

#[cfg(feature = "wgpu")]
pub use wgpu_device::WgpuDevice;
