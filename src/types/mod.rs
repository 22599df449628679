//! Common types and descriptors for buffer resources.
//!
//! This module contains usage flags, memory property flags, texel formats,
//! and the descriptor struct used to create a [`GpuBuffer`](crate::GpuBuffer).

mod buffer;

pub use buffer::{BufferDescriptor, BufferFormat, BufferRange, BufferUsage, MemoryProperties};
