//! Frame-synchronized streaming allocator for CPU-to-GPU uploads.
//!
//! A [`StreamingAllocator`] owns one host-visible [`GpuBuffer`] that stays
//! mapped for its whole lifetime. Each frame, callers carve transient regions
//! out of it; a region is handed out again only after its reuse delay (the
//! number of frames the GPU may still be reading it) has elapsed.
//!
//! The allocator never waits for the GPU. When the next region is still in
//! use, allocation fails with [`GraphicsError::RingExhausted`] and the caller
//! decides whether to retry next frame, grow the ring, or skip the upload.
//!
//! # Threading
//!
//! The ring is kept in a `RefCell` and the mapping is a raw pointer, so the
//! allocator is neither `Send` nor `Sync`. Use it from the thread that
//! submits frames.

mod ring;

use std::cell::RefCell;
use std::marker::PhantomData;
use std::ptr::NonNull;

use bytemuck::Pod;

use crate::backend::BufferDevice;
use crate::buffer::GpuBuffer;
use crate::context::RenderContext;
use crate::error::GraphicsError;
use crate::frame::FrameClock;
use crate::profiling::{profile_plot, profile_scope};
use crate::types::{BufferDescriptor, BufferRange, BufferUsage, MemoryProperties};

pub use ring::{Block, BlockRing};

/// Descriptor for creating a [`StreamingAllocator`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UploadBufferDescriptor {
    /// Debug label of the backing buffer.
    pub label: Option<String>,
    /// Size of the ring in bytes.
    pub capacity: u64,
    /// Frames that must elapse before a region is reused.
    pub reuse_delay: u32,
}

impl UploadBufferDescriptor {
    /// Create a new upload buffer descriptor.
    pub fn new(capacity: u64, reuse_delay: u32) -> Self {
        Self {
            label: None,
            capacity,
            reuse_delay,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Backing buffer and its persistent mapping.
struct Backing<D: BufferDevice> {
    buffer: GpuBuffer<D>,
    base: NonNull<u8>,
    alignment: u64,
}

/// Bump allocator over a persistently mapped ring buffer.
pub struct StreamingAllocator<D: BufferDevice> {
    device: D,
    clock: FrameClock,
    capacity: u64,
    reuse_delay: u32,
    label: Option<String>,
    backing: Option<Backing<D>>,
    ring: RefCell<BlockRing>,
}

impl<D: BufferDevice> StreamingAllocator<D> {
    /// Create an allocator of `capacity` bytes for `context`.
    ///
    /// The reuse delay is the context's frames-in-flight depth. No device
    /// memory is allocated until [`initialize`](Self::initialize).
    pub fn new(context: &RenderContext<D>, capacity: u64) -> Self {
        Self::with_descriptor(
            context,
            UploadBufferDescriptor::new(capacity, context.frames_in_flight()),
        )
    }

    /// Create an allocator from an explicit descriptor.
    pub fn with_descriptor(context: &RenderContext<D>, descriptor: UploadBufferDescriptor) -> Self {
        let reuse_delay = if descriptor.reuse_delay == 0 {
            log::warn!(
                "Upload buffer {:?}: reuse delay of 0 frames would alias live data, using 1",
                descriptor.label
            );
            1
        } else {
            descriptor.reuse_delay
        };

        Self {
            device: context.device().clone(),
            clock: context.frame_clock(),
            capacity: descriptor.capacity,
            reuse_delay,
            label: descriptor.label,
            backing: None,
            ring: RefCell::new(BlockRing::new(descriptor.capacity)),
        }
    }

    /// Create the backing buffer and map it for the allocator's lifetime.
    ///
    /// The capacity is rounded up to the device's offset alignment, so
    /// [`size`](Self::size) may grow here. Calling this again once
    /// initialized does nothing.
    pub fn initialize(&mut self) -> Result<(), GraphicsError> {
        if self.backing.is_some() {
            log::warn!("Upload buffer {:?} is already initialized", self.label);
            return Ok(());
        }

        let alignment = self.device.offset_alignment().max(1);
        let capacity = self.capacity.checked_next_multiple_of(alignment).ok_or_else(|| {
            GraphicsError::ValidationFailed(format!(
                "upload capacity {} overflows when aligned to {alignment}",
                self.capacity
            ))
        })?;
        if capacity != self.capacity {
            log::debug!(
                "Upload buffer {:?}: capacity {} rounded up to {capacity}",
                self.label,
                self.capacity
            );
        }

        let mut descriptor = BufferDescriptor::new(
            capacity,
            BufferUsage::UNIFORM | BufferUsage::STORAGE | BufferUsage::COPY_SRC,
        )
        .with_memory_properties(MemoryProperties::UPLOAD);
        descriptor.label = self.label.clone();

        let mut buffer = GpuBuffer::new(&self.device, &descriptor)?;
        let base = buffer.map()?;

        self.capacity = capacity;
        self.ring = RefCell::new(BlockRing::new(capacity));

        log::info!(
            "Upload buffer {:?} initialized: {} bytes, reuse delay {} frames, alignment {}",
            self.label,
            self.capacity,
            self.reuse_delay,
            alignment
        );

        self.backing = Some(Backing {
            buffer,
            base,
            alignment,
        });
        Ok(())
    }

    /// Allocate `byte_size` bytes for the current frame.
    ///
    /// The size is rounded up to [`alignment`](Self::alignment). The returned
    /// pointer stays writable until the region is handed out again, which
    /// happens no earlier than `reuse_delay` frames from now.
    pub fn allocate_bytes(&self, byte_size: u64) -> Result<NonNull<u8>, GraphicsError> {
        self.allocate_region(byte_size).map(|(ptr, _)| ptr)
    }

    /// Allocate room for `count` values of `T` for the current frame.
    pub fn allocate<T: Pod>(&self, count: usize) -> Result<UploadAllocation<'_, T>, GraphicsError> {
        let align = std::mem::align_of::<T>() as u64;
        if let Some(backing) = &self.backing {
            if align > backing.alignment {
                return Err(GraphicsError::ValidationFailed(format!(
                    "element alignment {align} exceeds upload alignment {}",
                    backing.alignment
                )));
            }
        }

        let byte_size = (count as u64)
            .checked_mul(std::mem::size_of::<T>() as u64)
            .ok_or_else(|| {
                GraphicsError::ValidationFailed(format!("upload of {count} elements overflows"))
            })?;

        let (ptr, offset) = self.allocate_region(byte_size)?;
        Ok(UploadAllocation {
            ptr: ptr.cast::<T>(),
            len: count,
            offset,
            _allocator: PhantomData,
        })
    }

    /// Allocate room for `data` and copy it in.
    pub fn upload<T: Pod>(&self, data: &[T]) -> Result<UploadAllocation<'_, T>, GraphicsError> {
        let mut allocation = self.allocate::<T>(data.len())?;
        allocation.copy_from_slice(data);
        Ok(allocation)
    }

    /// Single allocation path shared by every entry point.
    fn allocate_region(&self, byte_size: u64) -> Result<(NonNull<u8>, u64), GraphicsError> {
        profile_scope!("StreamingAllocator::allocate");

        let backing = self.backing.as_ref().ok_or(GraphicsError::NotInitialized)?;
        if byte_size == 0 {
            return Err(GraphicsError::ValidationFailed(
                "upload allocation of zero bytes".to_string(),
            ));
        }

        let size = byte_size
            .checked_next_multiple_of(backing.alignment)
            .filter(|size| *size <= self.capacity)
            .ok_or_else(|| {
                GraphicsError::ValidationFailed(format!(
                    "upload of {byte_size} bytes does not fit a {} byte ring",
                    self.capacity
                ))
            })?;

        let frame = self.clock.current();
        let mut ring = self.ring.borrow_mut();
        let Some(offset) = ring.reserve(size, frame, self.reuse_delay) else {
            log::debug!(
                "Upload buffer {:?} exhausted at frame {}: {} bytes requested, {} pending",
                self.label,
                frame,
                size,
                ring.pending_bytes(frame)
            );
            return Err(GraphicsError::RingExhausted {
                requested: size,
                capacity: self.capacity,
            });
        };

        profile_plot!("upload_ring_live_bytes", ring.live_bytes());
        log::trace!("Upload allocation at frame {frame}: {size} bytes at offset {offset}");

        // SAFETY: offset + size <= capacity, which is the mapped range.
        let ptr = unsafe { NonNull::new_unchecked(backing.base.as_ptr().add(offset as usize)) };
        Ok((ptr, offset))
    }

    /// Byte offset of a pointer returned by this allocator.
    ///
    /// Returns `None` for pointers outside the ring.
    pub fn offset_of<T>(&self, ptr: *const T) -> Option<u64> {
        let backing = self.backing.as_ref()?;
        let offset = (ptr as usize).checked_sub(backing.base.as_ptr() as usize)? as u64;
        (offset < self.capacity).then_some(offset)
    }

    /// Descriptor range covering an allocation.
    pub fn binding<T>(
        &self,
        allocation: &UploadAllocation<'_, T>,
    ) -> Option<BufferRange<D::Buffer>> {
        let buffer = self.resource()?;
        Some(BufferRange {
            buffer,
            offset: allocation.offset(),
            size: allocation.size_bytes(),
        })
    }

    /// Capacity in bytes, aligned once initialized.
    pub fn size(&self) -> u64 {
        self.capacity
    }

    /// Native handle of the backing buffer, once initialized.
    pub fn resource(&self) -> Option<D::Buffer> {
        self.backing.as_ref().map(|backing| backing.buffer.raw())
    }

    /// The backing buffer, once initialized.
    pub fn buffer(&self) -> Option<&GpuBuffer<D>> {
        self.backing.as_ref().map(|backing| &backing.buffer)
    }

    /// Allocation granularity, once initialized.
    pub fn alignment(&self) -> Option<u64> {
        self.backing.as_ref().map(|backing| backing.alignment)
    }

    /// Frames that must elapse before a region is reused.
    pub fn reuse_delay(&self) -> u32 {
        self.reuse_delay
    }

    /// Whether [`initialize`](Self::initialize) has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.backing.is_some()
    }

    /// Debug label.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Bytes the GPU may still be reading at the current frame.
    pub fn pending_bytes(&self) -> u64 {
        self.ring.borrow().pending_bytes(self.clock.current())
    }

    /// Bytes held by every block record, reclaimable or not.
    pub fn live_bytes(&self) -> u64 {
        self.ring.borrow().live_bytes()
    }

    /// Number of block records currently held by the ring.
    pub fn live_blocks(&self) -> usize {
        self.ring.borrow().len()
    }
}

impl<D: BufferDevice> std::fmt::Debug for StreamingAllocator<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingAllocator")
            .field("label", &self.label)
            .field("capacity", &self.capacity)
            .field("reuse_delay", &self.reuse_delay)
            .field("initialized", &self.backing.is_some())
            .field("ring", &self.ring.borrow())
            .finish_non_exhaustive()
    }
}

/// A typed region of the upload ring, valid for the current frame.
///
/// Borrows the allocator, so the mapping outlives it.
#[derive(Debug)]
pub struct UploadAllocation<'a, T> {
    ptr: NonNull<T>,
    len: usize,
    offset: u64,
    _allocator: PhantomData<&'a ()>,
}

impl<T> UploadAllocation<'_, T> {
    /// Pointer to the first element.
    pub fn as_ptr(&self) -> NonNull<T> {
        self.ptr
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the allocation holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte offset within the upload buffer.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Size of the elements in bytes, without alignment padding.
    pub fn size_bytes(&self) -> u64 {
        (self.len * std::mem::size_of::<T>()) as u64
    }
}

impl<T: Pod> UploadAllocation<'_, T> {
    /// Copy `data` into the allocation.
    ///
    /// # Panics
    ///
    /// Panics if `data.len()` differs from the allocation length.
    pub fn copy_from_slice(&mut self, data: &[T]) {
        assert_eq!(
            data.len(),
            self.len,
            "upload data length does not match allocation length"
        );
        let bytes: &[u8] = bytemuck::cast_slice(data);
        // SAFETY: the region holds `len * size_of::<T>()` mapped bytes and
        // cannot overlap `data`, which lives in host memory.
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                self.ptr.as_ptr().cast::<u8>(),
                bytes.len(),
            );
        }
    }

    /// Write one element.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    pub fn write(&mut self, index: usize, value: T) {
        assert!(index < self.len, "upload index {index} out of bounds");
        // SAFETY: index is in bounds of the mapped region.
        unsafe { self.ptr.as_ptr().add(index).write_unaligned(value) };
    }

    /// View the allocation as a mutable slice.
    ///
    /// # Safety
    ///
    /// The region must not have been handed out again, which happens once
    /// the frame clock has advanced by the reuse delay, and the mapped base
    /// must be aligned for `T`.
    pub unsafe fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DummyDevice, DummyDeviceConfig};

    fn context(alignment: u64) -> RenderContext<DummyDevice> {
        let device =
            DummyDevice::with_config(DummyDeviceConfig::default().with_offset_alignment(alignment));
        RenderContext::new(device).with_frames_in_flight(2)
    }

    #[test]
    fn test_construct_does_no_device_work() {
        let ctx = context(256);
        let allocator = StreamingAllocator::new(&ctx, 1024);
        assert_eq!(ctx.device().stats().buffers_created, 0);
        assert!(!allocator.is_initialized());
        assert_eq!(allocator.resource(), None);
        assert_eq!(allocator.reuse_delay(), 2);
        assert_eq!(
            allocator.allocate_bytes(16),
            Err(GraphicsError::NotInitialized)
        );
    }

    #[test]
    fn test_initialize_maps_once() {
        let ctx = context(256);
        let mut allocator = StreamingAllocator::new(&ctx, 1024);
        allocator.initialize().unwrap();
        allocator.initialize().unwrap();

        let stats = ctx.device().stats();
        assert_eq!(stats.buffers_created, 1);
        assert_eq!(stats.maps, 1);
        assert_eq!(allocator.alignment(), Some(256));
        assert!(allocator.buffer().is_some_and(|b| b.is_mapped()));
    }

    #[test]
    fn test_sizes_round_up_to_alignment() {
        let ctx = context(64);
        let mut allocator = StreamingAllocator::new(&ctx, 1024);
        allocator.initialize().unwrap();

        let a = allocator.allocate::<u32>(3).unwrap();
        let b = allocator.allocate::<u32>(1).unwrap();
        assert_eq!(a.offset(), 0);
        assert_eq!(b.offset(), 64);
        assert_eq!(a.size_bytes(), 12);
    }

    #[test]
    fn test_zero_and_oversized_requests() {
        let ctx = context(256);
        let mut allocator = StreamingAllocator::new(&ctx, 1024);
        allocator.initialize().unwrap();

        assert!(matches!(
            allocator.allocate_bytes(0),
            Err(GraphicsError::ValidationFailed(_))
        ));
        assert!(matches!(
            allocator.allocate_bytes(1025),
            Err(GraphicsError::ValidationFailed(_))
        ));
        assert!(matches!(
            allocator.allocate_bytes(u64::MAX),
            Err(GraphicsError::ValidationFailed(_))
        ));
        assert_eq!(allocator.live_blocks(), 0);
    }

    #[test]
    fn test_zero_reuse_delay_clamped() {
        let ctx = context(256);
        let allocator =
            StreamingAllocator::with_descriptor(&ctx, UploadBufferDescriptor::new(512, 0));
        assert_eq!(allocator.reuse_delay(), 1);
    }

    #[test]
    fn test_offset_of() {
        let ctx = context(256);
        let mut allocator = StreamingAllocator::new(&ctx, 1024);
        allocator.initialize().unwrap();

        let first = allocator.allocate_bytes(100).unwrap();
        let second = allocator.allocate_bytes(100).unwrap();
        assert_eq!(allocator.offset_of(first.as_ptr()), Some(0));
        assert_eq!(allocator.offset_of(second.as_ptr()), Some(256));

        let outside = 0u8;
        assert_eq!(allocator.offset_of(&outside as *const u8), None);
    }

    #[test]
    fn test_binding_range() {
        let ctx = context(256);
        let mut allocator = StreamingAllocator::with_descriptor(
            &ctx,
            UploadBufferDescriptor::new(1024, 2).with_label("sssr_constants"),
        );
        allocator.initialize().unwrap();

        allocator.allocate_bytes(8).unwrap();
        let allocation = allocator.upload(&[1.0f32, 2.0, 3.0, 4.0]).unwrap();
        let range = allocator.binding(&allocation).unwrap();
        assert_eq!(range.buffer, allocator.resource().unwrap());
        assert_eq!(range.offset, 256);
        assert_eq!(range.size, 16);
        assert_eq!(
            ctx.device().buffer_name(range.buffer).as_deref(),
            Some("sssr_constants")
        );
    }

    #[test]
    fn test_capacity_rounded_to_alignment() {
        let ctx = context(256);
        let mut allocator = StreamingAllocator::new(&ctx, 1000);
        assert_eq!(allocator.size(), 1000);
        allocator.initialize().unwrap();

        assert_eq!(allocator.size(), 1024);
        assert_eq!(allocator.buffer().map(|b| b.size()), Some(1024));
        assert_eq!(allocator.allocate::<u8>(900).unwrap().offset(), 0);
    }

    #[test]
    fn test_element_alignment_above_upload_alignment() {
        let ctx = context(2);
        let mut allocator = StreamingAllocator::new(&ctx, 64);
        allocator.initialize().unwrap();

        assert!(matches!(
            allocator.allocate::<u32>(1),
            Err(GraphicsError::ValidationFailed(_))
        ));
        assert!(allocator.allocate::<u16>(1).is_ok());
        assert_eq!(allocator.live_blocks(), 1);
    }

    #[test]
    fn test_element_count_overflow() {
        let ctx = context(256);
        let mut allocator = StreamingAllocator::new(&ctx, 1024);
        allocator.initialize().unwrap();

        assert!(matches!(
            allocator.allocate::<[u64; 4]>(usize::MAX),
            Err(GraphicsError::ValidationFailed(_))
        ));
        assert_eq!(allocator.live_blocks(), 0);
    }

    #[test]
    fn test_live_bytes_follow_reclaim() {
        let ctx = context(256);
        let mut allocator = StreamingAllocator::new(&ctx, 1024);
        allocator.initialize().unwrap();

        allocator.allocate_bytes(512).unwrap();
        allocator.allocate_bytes(100).unwrap();
        assert_eq!(allocator.live_bytes(), 768);

        ctx.advance_frame();
        ctx.advance_frame();
        assert_eq!(allocator.live_bytes(), 768);
        assert_eq!(allocator.pending_bytes(), 0);

        // Reclaims the 512 byte block at 0 and leaves the 256 byte one.
        allocator.allocate_bytes(512).unwrap();
        assert_eq!(allocator.live_bytes(), 768);
        assert_eq!(allocator.live_blocks(), 2);
    }

    #[test]
    fn test_teardown_releases_buffer() {
        let ctx = context(256);
        {
            let mut allocator = StreamingAllocator::new(&ctx, 4096);
            allocator.initialize().unwrap();
            allocator.upload(&[0u32; 16]).unwrap();
        }
        let stats = ctx.device().stats();
        assert_eq!(stats.unmaps, 1);
        assert!(stats.is_balanced());
    }
}
