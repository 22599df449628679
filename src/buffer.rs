//! Move-only GPU buffer owning its memory and optional typed view.

use std::ptr::NonNull;

use crate::backend::BufferDevice;
use crate::error::GraphicsError;
use crate::profiling::profile_scope;
use crate::types::BufferDescriptor;

/// A device buffer bound to its own dedicated memory allocation.
///
/// The buffer object, its memory, and the optional typed view are created
/// together by [`GpuBuffer::new`] and destroyed together when the value is
/// dropped (view, then buffer, then memory). Ownership moves with the value;
/// there is no `Clone`, so each set of handles is released exactly once.
///
/// Dropping destroys the handles immediately. Drop a buffer only once the GPU
/// no longer reads from it.
pub struct GpuBuffer<D: BufferDevice> {
    device: D,
    buffer: D::Buffer,
    view: Option<D::View>,
    memory: D::Memory,
    size: u64,
    label: Option<String>,
    mappable: bool,
    /// Mapped base pointer while the memory is mapped.
    mapped: Option<NonNull<u8>>,
}

/// Handles created so far by [`GpuBuffer::new`]. Releases them if creation
/// fails part-way through.
struct PartialBuffer<'a, D: BufferDevice> {
    device: &'a D,
    buffer: Option<D::Buffer>,
    memory: Option<D::Memory>,
    view: Option<D::View>,
}

impl<D: BufferDevice> PartialBuffer<'_, D> {
    /// Hand the handles over to their final owner.
    fn disarm(mut self) -> Option<D::View> {
        self.buffer = None;
        self.memory = None;
        self.view.take()
    }
}

impl<D: BufferDevice> Drop for PartialBuffer<'_, D> {
    fn drop(&mut self) {
        // SAFETY: the handles were never exposed, so the GPU cannot use them.
        unsafe {
            if let Some(view) = self.view.take() {
                self.device.destroy_buffer_view(view);
            }
            if let Some(buffer) = self.buffer.take() {
                self.device.destroy_buffer(buffer);
            }
            if let Some(memory) = self.memory.take() {
                self.device.free_memory(memory);
            }
        }
    }
}

impl<D: BufferDevice> GpuBuffer<D> {
    /// Create a buffer, allocate and bind its memory, and create a view if
    /// the descriptor has a format.
    ///
    /// Returns [`GraphicsError::ValidationFailed`] for inconsistent
    /// descriptors and [`GraphicsError::AllocationFailed`] when the device
    /// runs out of memory. Nothing is leaked on failure.
    pub fn new(device: &D, descriptor: &BufferDescriptor) -> Result<Self, GraphicsError> {
        profile_scope!("GpuBuffer::new");
        descriptor.validate()?;

        let mut partial = PartialBuffer {
            device,
            buffer: None,
            memory: None,
            view: None,
        };

        let buffer = device.create_buffer(descriptor.size, descriptor.usage)?;
        partial.buffer = Some(buffer);

        let memory = device.allocate_memory(buffer, descriptor.memory_properties)?;
        partial.memory = Some(memory);

        device.bind_buffer_memory(buffer, memory)?;

        if let Some(format) = descriptor.format {
            partial.view = Some(device.create_buffer_view(
                buffer,
                format,
                descriptor.usage,
                descriptor.size,
            )?);
        }

        if let Some(label) = &descriptor.label {
            device.set_buffer_name(buffer, label);
        }

        let view = partial.disarm();

        log::debug!(
            "{}: created buffer {:?} ({} bytes, {:?}, {:?})",
            device.name(),
            descriptor.label,
            descriptor.size,
            descriptor.usage,
            descriptor.memory_properties
        );

        Ok(Self {
            device: device.clone(),
            buffer,
            view,
            memory,
            size: descriptor.size,
            label: descriptor.label.clone(),
            mappable: descriptor.memory_properties.is_mappable(),
            mapped: None,
        })
    }

    /// Map the whole buffer for CPU access.
    ///
    /// The pointer stays valid until [`unmap`](Self::unmap) or drop.
    pub fn map(&mut self) -> Result<NonNull<u8>, GraphicsError> {
        if !self.mappable {
            return Err(GraphicsError::NotMappable);
        }
        if self.mapped.is_some() {
            return Err(GraphicsError::AlreadyMapped);
        }

        let ptr = self.device.map_memory(self.memory, self.size)?;
        self.mapped = Some(ptr);
        Ok(ptr)
    }

    /// Release CPU access obtained with [`map`](Self::map).
    pub fn unmap(&mut self) {
        if self.mapped.take().is_some() {
            // SAFETY: the memory is mapped, and pointers handed out by `map`
            // are raw, so dereferencing them afterwards already requires unsafe.
            unsafe { self.device.unmap_memory(self.memory) };
        } else {
            log::warn!("Unmapping buffer {:?} which is not mapped", self.label);
        }
    }

    /// Map the buffer for the lifetime of the returned guard.
    pub fn map_scoped(&mut self) -> Result<BufferMapping<'_, D>, GraphicsError> {
        let ptr = self.map()?;
        Ok(BufferMapping { buffer: self, ptr })
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Get the raw buffer handle.
    pub fn raw(&self) -> D::Buffer {
        self.buffer
    }

    /// Get the typed view, if the buffer was created with a format.
    pub fn view(&self) -> Option<D::View> {
        self.view
    }

    /// Get the memory handle.
    pub fn memory(&self) -> D::Memory {
        self.memory
    }

    /// Debug label.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Whether the memory is host-visible.
    pub fn is_mappable(&self) -> bool {
        self.mappable
    }

    /// Whether the memory is currently mapped.
    pub fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }

    /// Mapped base pointer, while mapped.
    pub fn mapped_ptr(&self) -> Option<NonNull<u8>> {
        self.mapped
    }

    /// Device the buffer was created on.
    pub fn device(&self) -> &D {
        &self.device
    }
}

impl<D: BufferDevice> Drop for GpuBuffer<D> {
    fn drop(&mut self) {
        log::trace!("Releasing buffer {:?} ({:?})", self.label, self.buffer);

        // SAFETY: the owner guarantees the GPU is done with the buffer.
        unsafe {
            if self.mapped.take().is_some() {
                self.device.unmap_memory(self.memory);
            }
            if let Some(view) = self.view.take() {
                self.device.destroy_buffer_view(view);
            }
            self.device.destroy_buffer(self.buffer);
            self.device.free_memory(self.memory);
        }
    }
}

impl<D: BufferDevice> std::fmt::Debug for GpuBuffer<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("label", &self.label)
            .field("buffer", &self.buffer)
            .field("view", &self.view)
            .field("size", &self.size)
            .field("mapped", &self.mapped.is_some())
            .finish_non_exhaustive()
    }
}

/// Scoped CPU mapping of a [`GpuBuffer`]. Unmaps on drop.
pub struct BufferMapping<'a, D: BufferDevice> {
    buffer: &'a mut GpuBuffer<D>,
    ptr: NonNull<u8>,
}

impl<D: BufferDevice> BufferMapping<'_, D> {
    /// Mapped bytes.
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: the mapping covers `size` bytes and lives as long as `self`.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.buffer.size as usize) }
    }

    /// Mapped bytes, writable.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: as above; `&mut self` makes the access exclusive on the CPU side.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.buffer.size as usize) }
    }

    /// Copy plain data into the buffer at `offset` bytes.
    ///
    /// # Panics
    ///
    /// Panics if the data does not fit in the buffer.
    pub fn write<T: bytemuck::NoUninit>(&mut self, offset: u64, data: &[T]) {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let start = offset as usize;
        self.as_mut_slice()[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Mapped base pointer.
    pub fn as_ptr(&self) -> NonNull<u8> {
        self.ptr
    }
}

impl<D: BufferDevice> Drop for BufferMapping<'_, D> {
    fn drop(&mut self) {
        self.buffer.unmap();
    }
}
