//! GPU backend abstraction layer.
//!
//! Buffers and upload rings are written against the [`BufferDevice`] trait,
//! which exposes the handful of device entry points a buffer needs.
//!
//! # Available Backends
//!
//! - [`DummyDevice`]: host-memory backend that counts every handle it creates
//!   and releases. Always available; used by tests and benchmarks.
//! - `VulkanDevice` (`vulkan-backend` feature): native Vulkan through ash.

pub mod dummy;

#[cfg(feature = "vulkan-backend")]
pub mod vulkan;

use std::fmt::Debug;
use std::ptr::NonNull;

use crate::error::GraphicsError;
use crate::types::{BufferFormat, BufferUsage, MemoryProperties};

pub use dummy::{DummyDevice, DummyDeviceConfig, DummyStats};
#[cfg(feature = "vulkan-backend")]
pub use vulkan::VulkanDevice;

/// Device entry points needed to create, bind, map, and release buffers.
///
/// Implementations are cheap handles (clones share the same device), so a
/// [`GpuBuffer`](crate::GpuBuffer) keeps its own copy for use in `Drop`.
///
/// Every handle returned by a `create_*`/`allocate_*` call must later be
/// passed to the matching release call exactly once.
pub trait BufferDevice: Clone {
    /// Native buffer handle.
    type Buffer: Copy + Eq + Debug;
    /// Native typed buffer view handle.
    type View: Copy + Eq + Debug;
    /// Native device memory handle.
    type Memory: Copy + Eq + Debug;

    /// Human-readable backend name.
    fn name(&self) -> &'static str;

    /// Create an unbound buffer object.
    fn create_buffer(&self, size: u64, usage: BufferUsage)
        -> Result<Self::Buffer, GraphicsError>;

    /// Allocate a dedicated memory region satisfying the buffer's requirements.
    fn allocate_memory(
        &self,
        buffer: Self::Buffer,
        properties: MemoryProperties,
    ) -> Result<Self::Memory, GraphicsError>;

    /// Bind memory to a buffer at offset zero.
    fn bind_buffer_memory(
        &self,
        buffer: Self::Buffer,
        memory: Self::Memory,
    ) -> Result<(), GraphicsError>;

    /// Create a typed view covering the whole buffer of `size` bytes.
    ///
    /// Fails with [`GraphicsError::ValidationFailed`] when the device cannot
    /// use `format` for the texel usages in `usage`, or when the view would
    /// exceed the device's texel element limit.
    fn create_buffer_view(
        &self,
        buffer: Self::Buffer,
        format: BufferFormat,
        usage: BufferUsage,
        size: u64,
    ) -> Result<Self::View, GraphicsError>;

    /// Attach a debug name to a buffer. Backends without naming support ignore it.
    fn set_buffer_name(&self, buffer: Self::Buffer, name: &str);

    /// Map `size` bytes of memory from offset zero.
    fn map_memory(&self, memory: Self::Memory, size: u64) -> Result<NonNull<u8>, GraphicsError>;

    /// Minimum alignment for offsets bound as uniform, storage, or texel ranges.
    fn offset_alignment(&self) -> u64;

    /// Unmap previously mapped memory.
    ///
    /// # Safety
    ///
    /// `memory` must be currently mapped and no CPU access through the
    /// mapped pointer may happen afterwards.
    unsafe fn unmap_memory(&self, memory: Self::Memory);

    /// Destroy a buffer view.
    ///
    /// # Safety
    ///
    /// The GPU must no longer use the view.
    unsafe fn destroy_buffer_view(&self, view: Self::View);

    /// Destroy a buffer object.
    ///
    /// # Safety
    ///
    /// The GPU must no longer use the buffer and all of its views are destroyed.
    unsafe fn destroy_buffer(&self, buffer: Self::Buffer);

    /// Free a memory allocation.
    ///
    /// # Safety
    ///
    /// No buffer bound to the memory may be used afterwards.
    unsafe fn free_memory(&self, memory: Self::Memory);
}
