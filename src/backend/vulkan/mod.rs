//! Native Vulkan backend implementation using ash.
//!
//! Each buffer gets its own `vkAllocateMemory` allocation. The number of
//! buffers an effect pass needs is small, so no sub-allocator sits in between.

pub(crate) mod conversion;

use std::ffi::CString;
use std::ptr::NonNull;

use ash::vk;

use crate::error::GraphicsError;
use crate::types::{BufferFormat, BufferRange, BufferUsage, MemoryProperties};

use self::conversion::{
    convert_buffer_format, convert_buffer_usage, convert_memory_properties, convert_vk_error,
};
use super::BufferDevice;

/// Vulkan device handle used to create buffers.
///
/// Wraps a logical device together with the physical-device data buffer
/// creation needs: memory types and offset alignment limits.
#[derive(Clone)]
pub struct VulkanDevice {
    /// Logical device. Not owned: never destroyed by this type.
    device: ash::Device,
    /// Memory heaps and types of the physical device.
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Largest of the uniform, storage, texel offset and non-coherent atom limits.
    offset_alignment: u64,
    /// Buffer features of every [`BufferFormat`], queried once.
    format_features: Vec<(BufferFormat, vk::FormatFeatureFlags)>,
    /// `maxTexelBufferElements`.
    max_texel_buffer_elements: u64,
    /// Debug utils extension, when object naming is available.
    debug_utils: Option<ash::ext::debug_utils::Device>,
}

impl std::fmt::Debug for VulkanDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VulkanDevice")
            .field("device", &self.device.handle())
            .field("offset_alignment", &self.offset_alignment)
            .field("debug_names", &self.debug_utils.is_some())
            .finish()
    }
}

impl VulkanDevice {
    /// Create a buffer device for `device`, created from `physical_device`.
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
    ) -> Self {
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let limits = unsafe { instance.get_physical_device_properties(physical_device) }.limits;

        let offset_alignment = [
            limits.min_uniform_buffer_offset_alignment,
            limits.min_storage_buffer_offset_alignment,
            limits.min_texel_buffer_offset_alignment,
            limits.non_coherent_atom_size,
        ]
        .into_iter()
        .max()
        .unwrap_or(1)
        .max(1);

        let format_features = BufferFormat::ALL
            .into_iter()
            .map(|format| {
                let properties = unsafe {
                    instance.get_physical_device_format_properties(
                        physical_device,
                        convert_buffer_format(format),
                    )
                };
                (format, properties.buffer_features)
            })
            .collect();

        Self {
            device,
            memory_properties,
            offset_alignment,
            format_features,
            max_texel_buffer_elements: u64::from(limits.max_texel_buffer_elements),
            debug_utils: None,
        }
    }

    /// Enable debug names on created buffers.
    ///
    /// The instance must have been created with `VK_EXT_debug_utils` enabled.
    pub fn with_debug_utils(mut self, instance: &ash::Instance) -> Self {
        self.debug_utils = Some(ash::ext::debug_utils::Device::new(instance, &self.device));
        self
    }

    /// Get the logical device.
    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    fn buffer_features(&self, format: BufferFormat) -> vk::FormatFeatureFlags {
        self.format_features
            .iter()
            .find(|(candidate, _)| *candidate == format)
            .map(|(_, features)| *features)
            .unwrap_or_default()
    }
}

/// Find a memory type allowed by `type_bits` that has all of `flags`.
fn find_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    let count = properties.memory_type_count as usize;
    properties.memory_types[..count]
        .iter()
        .enumerate()
        .find(|(index, memory_type)| {
            type_bits & (1 << index) != 0 && memory_type.property_flags.contains(flags)
        })
        .map(|(index, _)| index as u32)
}

/// Check that a `format` view over `size` bytes is valid for `usage`.
fn check_texel_view(
    features: vk::FormatFeatureFlags,
    max_elements: u64,
    format: BufferFormat,
    usage: BufferUsage,
    size: u64,
) -> Result<(), GraphicsError> {
    let mut required = vk::FormatFeatureFlags::empty();
    if usage.contains(BufferUsage::UNIFORM_TEXEL) {
        required |= vk::FormatFeatureFlags::UNIFORM_TEXEL_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE_TEXEL) {
        required |= vk::FormatFeatureFlags::STORAGE_TEXEL_BUFFER;
    }

    if required.is_empty() {
        return Err(GraphicsError::ValidationFailed(format!(
            "{format:?} view requires texel usage, got {usage:?}"
        )));
    }
    if !features.contains(required) {
        return Err(GraphicsError::ValidationFailed(format!(
            "{format:?} does not support {required:?} (supported: {features:?})"
        )));
    }

    let elements = size / format.texel_size();
    if elements > max_elements {
        return Err(GraphicsError::ValidationFailed(format!(
            "{format:?} view of {elements} texels exceeds maxTexelBufferElements ({max_elements})"
        )));
    }
    Ok(())
}

impl BufferDevice for VulkanDevice {
    type Buffer = vk::Buffer;
    type View = vk::BufferView;
    type Memory = vk::DeviceMemory;

    fn name(&self) -> &'static str {
        "Vulkan Backend (ash)"
    }

    fn create_buffer(
        &self,
        size: u64,
        usage: BufferUsage,
    ) -> Result<vk::Buffer, GraphicsError> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(convert_buffer_usage(usage))
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        unsafe { self.device.create_buffer(&buffer_info, None) }
            .map_err(|e| convert_vk_error("create buffer", e))
    }

    fn allocate_memory(
        &self,
        buffer: vk::Buffer,
        properties: MemoryProperties,
    ) -> Result<vk::DeviceMemory, GraphicsError> {
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let flags = convert_memory_properties(properties);

        let memory_type_index =
            find_memory_type(&self.memory_properties, requirements.memory_type_bits, flags)
                .ok_or_else(|| {
                    GraphicsError::ValidationFailed(format!(
                        "No memory type with {:?} for type bits {:#b}",
                        flags, requirements.memory_type_bits
                    ))
                })?;

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        unsafe { self.device.allocate_memory(&alloc_info, None) }
            .map_err(|e| convert_vk_error("allocate buffer memory", e))
    }

    fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
    ) -> Result<(), GraphicsError> {
        unsafe { self.device.bind_buffer_memory(buffer, memory, 0) }
            .map_err(|e| convert_vk_error("bind buffer memory", e))
    }

    fn create_buffer_view(
        &self,
        buffer: vk::Buffer,
        format: BufferFormat,
        usage: BufferUsage,
        size: u64,
    ) -> Result<vk::BufferView, GraphicsError> {
        check_texel_view(
            self.buffer_features(format),
            self.max_texel_buffer_elements,
            format,
            usage,
            size,
        )?;

        let view_info = vk::BufferViewCreateInfo::default()
            .buffer(buffer)
            .format(convert_buffer_format(format))
            .offset(0)
            .range(vk::WHOLE_SIZE);

        unsafe { self.device.create_buffer_view(&view_info, None) }
            .map_err(|e| convert_vk_error("create buffer view", e))
    }

    fn set_buffer_name(&self, buffer: vk::Buffer, name: &str) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            log::warn!("Buffer name {name:?} contains a NUL byte, not attaching it");
            return;
        };

        let name_info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(buffer)
            .object_name(&name);
        if let Err(e) = unsafe { debug_utils.set_debug_utils_object_name(&name_info) } {
            log::warn!("Failed to set buffer debug name: {:?}", e);
        }
    }

    fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        size: u64,
    ) -> Result<NonNull<u8>, GraphicsError> {
        let ptr = unsafe {
            self.device
                .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())
        }
        .map_err(|e| convert_vk_error("map buffer memory", e))?;

        NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| GraphicsError::Internal("vkMapMemory returned null".to_string()))
    }

    fn offset_alignment(&self) -> u64 {
        self.offset_alignment
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.unmap_memory(memory) };
    }

    unsafe fn destroy_buffer_view(&self, view: vk::BufferView) {
        unsafe { self.device.destroy_buffer_view(view, None) };
    }

    unsafe fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.device.destroy_buffer(buffer, None) };
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.free_memory(memory, None) };
    }
}

impl From<BufferRange<vk::Buffer>> for vk::DescriptorBufferInfo {
    fn from(range: BufferRange<vk::Buffer>) -> Self {
        vk::DescriptorBufferInfo::default()
            .buffer(range.buffer)
            .offset(range.offset)
            .range(range.size)
    }
}
