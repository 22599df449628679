//! Rendering context.
//!
//! [`RenderContext`] pairs a [`BufferDevice`] with the frame counter that
//! drives resource reuse. Everything created from it shares the device
//! handle and observes the same frame index.

use crate::backend::BufferDevice;
use crate::buffer::GpuBuffer;
use crate::error::GraphicsError;
use crate::frame::{FrameClock, FrameCounter};
use crate::types::BufferDescriptor;
use crate::upload::StreamingAllocator;

/// Default number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: u32 = 3;

/// Device plus frame pacing state.
#[derive(Debug)]
pub struct RenderContext<D: BufferDevice> {
    device: D,
    frame_counter: FrameCounter,
    frames_in_flight: u32,
}

impl<D: BufferDevice> RenderContext<D> {
    /// Create a context at frame 0 with [`MAX_FRAMES_IN_FLIGHT`].
    pub fn new(device: D) -> Self {
        log::info!(
            "Render context created on {} ({} frames in flight)",
            device.name(),
            MAX_FRAMES_IN_FLIGHT
        );
        Self {
            device,
            frame_counter: FrameCounter::new(),
            frames_in_flight: MAX_FRAMES_IN_FLIGHT,
        }
    }

    /// Override the frames-in-flight depth. Values below 1 are raised to 1.
    pub fn with_frames_in_flight(mut self, frames: u32) -> Self {
        self.frames_in_flight = frames.max(1);
        self
    }

    /// Get the device.
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Read-only handle to the frame index.
    pub fn frame_clock(&self) -> FrameClock {
        self.frame_counter.clock()
    }

    /// Current frame index.
    pub fn frame_index(&self) -> u64 {
        self.frame_counter.current()
    }

    /// Frames the CPU may record ahead of the GPU.
    pub fn frames_in_flight(&self) -> u32 {
        self.frames_in_flight
    }

    /// Advance to the next frame and return its index.
    ///
    /// Upload regions written `frames_in_flight` frames ago become reusable,
    /// so only call this once the GPU has finished the frame that many
    /// frames back (typically after waiting on its fence).
    pub fn advance_frame(&self) -> u64 {
        let frame = self.frame_counter.advance();
        log::trace!("Advanced to frame {frame}");
        frame
    }

    /// Create a buffer on this context's device.
    pub fn create_buffer(
        &self,
        descriptor: &BufferDescriptor,
    ) -> Result<GpuBuffer<D>, GraphicsError> {
        GpuBuffer::new(&self.device, descriptor)
    }

    /// Create and initialize a streaming allocator of `capacity` bytes.
    pub fn create_streaming_allocator(
        &self,
        capacity: u64,
    ) -> Result<StreamingAllocator<D>, GraphicsError> {
        let mut allocator = StreamingAllocator::new(self, capacity);
        allocator.initialize()?;
        Ok(allocator)
    }
}
