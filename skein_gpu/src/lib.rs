//! Explicit graphics API layer used by the scene loader and the frame scheduler.
//!
//! Every GPU call goes through the [`device::Device`] trait. [`device::VulkanDevice`] drives a
//! real GPU through ash, [`device::HeadlessDevice`] simulates one for tests and tooling.

pub mod command;
pub mod context;
pub mod descriptor;
pub mod device;
pub mod error;
pub mod resource;
pub mod sync;
pub mod traits;
pub mod transfer;
pub mod util;
pub mod wsi;

pub use context::GraphicsContext;
pub use error::GpuError;

pub type Result<T, E = GpuError> = std::result::Result<T, E>;

// Re-exports
pub use {ash, gpu_allocator, raw_window_handle};
