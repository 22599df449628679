//! Dummy GPU backend for testing and development.
//!
//! This backend doesn't talk to a GPU. Buffer memory lives in host
//! allocations so mapping returns real pointers, and every handle it hands
//! out is tracked so tests can assert that nothing leaks or is released twice.

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::GraphicsError;
use crate::types::{BufferFormat, BufferUsage, MemoryProperties};

use super::BufferDevice;

/// Opaque handle for dummy buffers, views, and memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DummyHandle(u64);

/// Configuration of a [`DummyDevice`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DummyDeviceConfig {
    /// Total bytes of memory the device can hand out.
    pub memory_budget: u64,
    /// Memory properties offered by the single memory type.
    pub memory_properties: MemoryProperties,
    /// Reported offset alignment.
    pub offset_alignment: u64,
    /// Largest number of texels a buffer view may address.
    pub max_texel_buffer_elements: u64,
}

impl Default for DummyDeviceConfig {
    fn default() -> Self {
        Self {
            memory_budget: 256 * 1024 * 1024,
            memory_properties: MemoryProperties::all(),
            offset_alignment: 256,
            max_texel_buffer_elements: 65536,
        }
    }
}

impl DummyDeviceConfig {
    /// Set the memory budget.
    pub fn with_memory_budget(mut self, bytes: u64) -> Self {
        self.memory_budget = bytes;
        self
    }

    /// Set the memory properties the device can satisfy.
    pub fn with_memory_properties(mut self, properties: MemoryProperties) -> Self {
        self.memory_properties = properties;
        self
    }

    /// Set the offset alignment.
    pub fn with_offset_alignment(mut self, alignment: u64) -> Self {
        self.offset_alignment = alignment;
        self
    }

    /// Set the texel element limit for buffer views.
    pub fn with_max_texel_buffer_elements(mut self, elements: u64) -> Self {
        self.max_texel_buffer_elements = elements;
        self
    }
}

/// Counters of every create and release call seen by a [`DummyDevice`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DummyStats {
    pub buffers_created: u64,
    pub buffers_destroyed: u64,
    pub views_created: u64,
    pub views_destroyed: u64,
    pub allocations: u64,
    pub frees: u64,
    pub maps: u64,
    pub unmaps: u64,
    /// Releases of handles that were unknown or already released.
    pub invalid_releases: u64,
}

impl DummyStats {
    /// Buffers created and not yet destroyed.
    pub fn live_buffers(&self) -> u64 {
        self.buffers_created - self.buffers_destroyed
    }

    /// Views created and not yet destroyed.
    pub fn live_views(&self) -> u64 {
        self.views_created - self.views_destroyed
    }

    /// Memory allocations not yet freed.
    pub fn live_allocations(&self) -> u64 {
        self.allocations - self.frees
    }

    /// True when every handle was released exactly once.
    pub fn is_balanced(&self) -> bool {
        self.live_buffers() == 0
            && self.live_views() == 0
            && self.live_allocations() == 0
            && self.invalid_releases == 0
    }
}

struct DummyBuffer {
    size: u64,
    memory: Option<DummyHandle>,
    name: Option<String>,
}

struct DummyMemory {
    // u128 storage keeps mapped pointers 16-byte aligned.
    storage: Box<[u128]>,
    size: u64,
    properties: MemoryProperties,
    mapped: bool,
}

#[derive(Default)]
struct DummyState {
    next_handle: u64,
    buffers: HashMap<DummyHandle, DummyBuffer>,
    views: HashMap<DummyHandle, DummyHandle>,
    memories: HashMap<DummyHandle, DummyMemory>,
    allocated_bytes: u64,
    stats: DummyStats,
}

impl DummyState {
    fn next(&mut self) -> DummyHandle {
        self.next_handle += 1;
        DummyHandle(self.next_handle)
    }
}

/// Dummy GPU device.
///
/// Clones share the same handle tables and counters.
#[derive(Clone, Default)]
pub struct DummyDevice {
    state: Arc<Mutex<DummyState>>,
    config: DummyDeviceConfig,
}

impl std::fmt::Debug for DummyDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DummyDevice")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl DummyDevice {
    /// Create a dummy device with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dummy device with a custom configuration.
    pub fn with_config(config: DummyDeviceConfig) -> Self {
        Self {
            state: Arc::default(),
            config,
        }
    }

    /// Snapshot of the create/release counters.
    pub fn stats(&self) -> DummyStats {
        self.state.lock().stats
    }

    /// Bytes of memory currently allocated.
    pub fn allocated_bytes(&self) -> u64 {
        self.state.lock().allocated_bytes
    }

    /// Debug name attached to a live buffer.
    pub fn buffer_name(&self, buffer: DummyHandle) -> Option<String> {
        self.state
            .lock()
            .buffers
            .get(&buffer)
            .and_then(|b| b.name.clone())
    }

    /// Whether the memory allocation is currently mapped.
    pub fn is_memory_mapped(&self, memory: DummyHandle) -> bool {
        self.state
            .lock()
            .memories
            .get(&memory)
            .is_some_and(|m| m.mapped)
    }

    /// Copy of the bytes stored in a live memory allocation.
    pub fn read_memory(&self, memory: DummyHandle, offset: u64, size: u64) -> Vec<u8> {
        let state = self.state.lock();
        let Some(mem) = state.memories.get(&memory) else {
            return Vec::new();
        };
        let bytes: &[u8] = bytemuck::cast_slice(&mem.storage[..]);
        let start = offset.min(mem.size) as usize;
        let end = offset.saturating_add(size).min(mem.size) as usize;
        bytes[start..end].to_vec()
    }
}

impl BufferDevice for DummyDevice {
    type Buffer = DummyHandle;
    type View = DummyHandle;
    type Memory = DummyHandle;

    fn name(&self) -> &'static str {
        "Dummy Backend"
    }

    fn create_buffer(
        &self,
        size: u64,
        usage: BufferUsage,
    ) -> Result<DummyHandle, GraphicsError> {
        log::trace!("DummyDevice: creating buffer (size: {size}, usage: {usage:?})");
        let mut state = self.state.lock();
        let handle = state.next();
        state.buffers.insert(
            handle,
            DummyBuffer {
                size,
                memory: None,
                name: None,
            },
        );
        state.stats.buffers_created += 1;
        Ok(handle)
    }

    fn allocate_memory(
        &self,
        buffer: DummyHandle,
        properties: MemoryProperties,
    ) -> Result<DummyHandle, GraphicsError> {
        let mut state = self.state.lock();
        let size = state
            .buffers
            .get(&buffer)
            .map(|b| b.size)
            .ok_or_else(|| GraphicsError::Internal(format!("unknown buffer {buffer:?}")))?;

        if !self.config.memory_properties.contains(properties) {
            return Err(GraphicsError::ValidationFailed(format!(
                "no memory type supports {properties:?}"
            )));
        }
        if state.allocated_bytes.saturating_add(size) > self.config.memory_budget {
            return Err(GraphicsError::AllocationFailed(format!(
                "out of device memory ({size} bytes requested, {} of {} in use)",
                state.allocated_bytes, self.config.memory_budget
            )));
        }

        let handle = state.next();
        let words = size.div_ceil(16) as usize;
        state.memories.insert(
            handle,
            DummyMemory {
                storage: vec![0u128; words].into_boxed_slice(),
                size,
                properties,
                mapped: false,
            },
        );
        state.allocated_bytes += size;
        state.stats.allocations += 1;
        Ok(handle)
    }

    fn bind_buffer_memory(
        &self,
        buffer: DummyHandle,
        memory: DummyHandle,
    ) -> Result<(), GraphicsError> {
        let mut state = self.state.lock();
        let memory_size = state
            .memories
            .get(&memory)
            .map(|m| m.size)
            .ok_or_else(|| GraphicsError::Internal(format!("unknown memory {memory:?}")))?;
        let buf = state
            .buffers
            .get_mut(&buffer)
            .ok_or_else(|| GraphicsError::Internal(format!("unknown buffer {buffer:?}")))?;

        if buf.memory.is_some() {
            return Err(GraphicsError::ValidationFailed(
                "buffer is already bound to memory".to_string(),
            ));
        }
        if memory_size < buf.size {
            return Err(GraphicsError::ValidationFailed(format!(
                "memory of {memory_size} bytes cannot back a {} byte buffer",
                buf.size
            )));
        }
        buf.memory = Some(memory);
        Ok(())
    }

    fn create_buffer_view(
        &self,
        buffer: DummyHandle,
        format: BufferFormat,
        usage: BufferUsage,
        size: u64,
    ) -> Result<DummyHandle, GraphicsError> {
        if !usage.intersects(BufferUsage::UNIFORM_TEXEL | BufferUsage::STORAGE_TEXEL) {
            return Err(GraphicsError::ValidationFailed(format!(
                "{format:?} view requires texel usage, got {usage:?}"
            )));
        }
        let elements = size / format.texel_size();
        if elements > self.config.max_texel_buffer_elements {
            return Err(GraphicsError::ValidationFailed(format!(
                "{format:?} view of {elements} texels exceeds the limit of {}",
                self.config.max_texel_buffer_elements
            )));
        }

        let mut state = self.state.lock();
        let Some(buf) = state.buffers.get(&buffer) else {
            return Err(GraphicsError::Internal(format!("unknown buffer {buffer:?}")));
        };
        if buf.memory.is_none() {
            return Err(GraphicsError::ValidationFailed(
                "buffer view requires bound memory".to_string(),
            ));
        }
        if buf.size < format.texel_size() {
            return Err(GraphicsError::ValidationFailed(format!(
                "buffer too small for a {format:?} texel"
            )));
        }

        let handle = state.next();
        state.views.insert(handle, buffer);
        state.stats.views_created += 1;
        Ok(handle)
    }

    fn set_buffer_name(&self, buffer: DummyHandle, name: &str) {
        if let Some(buf) = self.state.lock().buffers.get_mut(&buffer) {
            buf.name = Some(name.to_string());
        }
    }

    fn map_memory(&self, memory: DummyHandle, size: u64) -> Result<NonNull<u8>, GraphicsError> {
        let mut state = self.state.lock();
        let mem = state
            .memories
            .get_mut(&memory)
            .ok_or_else(|| GraphicsError::Internal(format!("unknown memory {memory:?}")))?;

        if !mem.properties.is_mappable() {
            return Err(GraphicsError::NotMappable);
        }
        if mem.mapped {
            return Err(GraphicsError::AlreadyMapped);
        }
        if size > mem.size {
            return Err(GraphicsError::ValidationFailed(format!(
                "cannot map {size} bytes of a {} byte allocation",
                mem.size
            )));
        }

        mem.mapped = true;
        let ptr = NonNull::new(mem.storage.as_mut_ptr().cast::<u8>())
            .unwrap_or_else(NonNull::dangling);
        state.stats.maps += 1;
        Ok(ptr)
    }

    fn offset_alignment(&self) -> u64 {
        self.config.offset_alignment
    }

    unsafe fn unmap_memory(&self, memory: DummyHandle) {
        let mut state = self.state.lock();
        let was_mapped = match state.memories.get_mut(&memory) {
            Some(mem) => std::mem::replace(&mut mem.mapped, false),
            None => false,
        };
        if was_mapped {
            state.stats.unmaps += 1;
        } else {
            log::warn!("DummyDevice: unmapping {memory:?} which is not mapped");
        }
    }

    unsafe fn destroy_buffer_view(&self, view: DummyHandle) {
        let mut state = self.state.lock();
        if state.views.remove(&view).is_some() {
            state.stats.views_destroyed += 1;
        } else {
            log::error!("DummyDevice: destroying unknown view {view:?}");
            state.stats.invalid_releases += 1;
        }
    }

    unsafe fn destroy_buffer(&self, buffer: DummyHandle) {
        let mut state = self.state.lock();
        if state.views.values().any(|b| *b == buffer) {
            log::error!("DummyDevice: destroying buffer {buffer:?} with live views");
            state.stats.invalid_releases += 1;
        }
        if state.buffers.remove(&buffer).is_some() {
            state.stats.buffers_destroyed += 1;
        } else {
            log::error!("DummyDevice: destroying unknown buffer {buffer:?}");
            state.stats.invalid_releases += 1;
        }
    }

    unsafe fn free_memory(&self, memory: DummyHandle) {
        let mut state = self.state.lock();
        match state.memories.remove(&memory) {
            Some(mem) => {
                state.allocated_bytes -= mem.size;
                state.stats.frees += 1;
            }
            None => {
                log::error!("DummyDevice: freeing unknown memory {memory:?}");
                state.stats.invalid_releases += 1;
            }
        }
    }
}
