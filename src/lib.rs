//! # GPU Upload
//!
//! RAII GPU buffers and a frame-synchronized streaming allocator for pushing
//! transient per-frame data (constants, instance data) to the GPU.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`GpuBuffer`] - Move-only buffer owning its memory and optional typed view
//! - [`StreamingAllocator`] - Ring allocator over one persistently mapped buffer
//! - [`RenderContext`] - Device handle plus the frame counter that gates reuse
//! - Backends: Vulkan (through ash) and Dummy (for testing)
//!
//! ## Example
//!
//! ```ignore
//! use gpu_upload::{DummyDevice, RenderContext};
//!
//! let context = RenderContext::new(DummyDevice::new());
//! let uploads = context.create_streaming_allocator(1 << 20)?;
//!
//! loop {
//!     let constants = uploads.upload(&[view_proj])?;
//!     let binding = uploads.binding(&constants);
//!     // Record GPU work reading `binding`, submit, wait for the old fence...
//!     context.advance_frame();
//! }
//! ```

pub mod backend;
pub mod buffer;
pub mod context;
pub mod error;
pub mod frame;
pub mod profiling;
pub mod types;
pub mod upload;

// Re-export main types for convenience
pub use backend::{BufferDevice, DummyDevice, DummyDeviceConfig, DummyStats};
#[cfg(feature = "vulkan-backend")]
pub use backend::VulkanDevice;
pub use buffer::{BufferMapping, GpuBuffer};
pub use context::{RenderContext, MAX_FRAMES_IN_FLIGHT};
pub use error::GraphicsError;
pub use frame::{FrameClock, FrameCounter};
pub use types::{BufferDescriptor, BufferFormat, BufferRange, BufferUsage, MemoryProperties};
pub use upload::{Block, BlockRing, StreamingAllocator, UploadAllocation, UploadBufferDescriptor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the upload subsystem.
///
/// This should be called before using any upload functionality.
pub fn init() {
    log::info!("GPU Upload v{} initialized", VERSION);
}
