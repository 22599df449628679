//! Type conversions between crate types and Vulkan types.

use ash::vk;

use crate::error::GraphicsError;
use crate::types::{BufferFormat, BufferUsage, MemoryProperties};

/// Convert BufferUsage flags to Vulkan buffer usage flags.
pub fn convert_buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    let mut result = vk::BufferUsageFlags::empty();

    if usage.contains(BufferUsage::VERTEX) {
        result |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if usage.contains(BufferUsage::INDEX) {
        result |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if usage.contains(BufferUsage::UNIFORM) {
        result |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE) {
        result |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if usage.contains(BufferUsage::INDIRECT) {
        result |= vk::BufferUsageFlags::INDIRECT_BUFFER;
    }
    if usage.contains(BufferUsage::COPY_SRC) {
        result |= vk::BufferUsageFlags::TRANSFER_SRC;
    }
    if usage.contains(BufferUsage::COPY_DST) {
        result |= vk::BufferUsageFlags::TRANSFER_DST;
    }
    if usage.contains(BufferUsage::UNIFORM_TEXEL) {
        result |= vk::BufferUsageFlags::UNIFORM_TEXEL_BUFFER;
    }
    if usage.contains(BufferUsage::STORAGE_TEXEL) {
        result |= vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER;
    }

    result
}

/// Convert MemoryProperties flags to Vulkan memory property flags.
pub fn convert_memory_properties(properties: MemoryProperties) -> vk::MemoryPropertyFlags {
    let mut result = vk::MemoryPropertyFlags::empty();

    if properties.contains(MemoryProperties::DEVICE_LOCAL) {
        result |= vk::MemoryPropertyFlags::DEVICE_LOCAL;
    }
    if properties.contains(MemoryProperties::HOST_VISIBLE) {
        result |= vk::MemoryPropertyFlags::HOST_VISIBLE;
    }
    if properties.contains(MemoryProperties::HOST_COHERENT) {
        result |= vk::MemoryPropertyFlags::HOST_COHERENT;
    }
    if properties.contains(MemoryProperties::HOST_CACHED) {
        result |= vk::MemoryPropertyFlags::HOST_CACHED;
    }
    if properties.contains(MemoryProperties::LAZILY_ALLOCATED) {
        result |= vk::MemoryPropertyFlags::LAZILY_ALLOCATED;
    }

    result
}

/// Convert BufferFormat to Vulkan format.
pub fn convert_buffer_format(format: BufferFormat) -> vk::Format {
    match format {
        BufferFormat::R32Uint => vk::Format::R32_UINT,
        BufferFormat::R32Sint => vk::Format::R32_SINT,
        BufferFormat::R32Float => vk::Format::R32_SFLOAT,
        BufferFormat::R16Float => vk::Format::R16_SFLOAT,
        BufferFormat::Rg32Uint => vk::Format::R32G32_UINT,
        BufferFormat::Rg32Float => vk::Format::R32G32_SFLOAT,
        BufferFormat::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        BufferFormat::Rgba16Float => vk::Format::R16G16B16A16_SFLOAT,
        BufferFormat::Rgba32Uint => vk::Format::R32G32B32A32_UINT,
        BufferFormat::Rgba32Float => vk::Format::R32G32B32A32_SFLOAT,
    }
}

/// Convert a failed Vulkan call into a [`GraphicsError`].
pub fn convert_vk_error(operation: &str, result: vk::Result) -> GraphicsError {
    match result {
        vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
        | vk::Result::ERROR_OUT_OF_HOST_MEMORY
        | vk::Result::ERROR_MEMORY_MAP_FAILED
        | vk::Result::ERROR_TOO_MANY_OBJECTS => {
            GraphicsError::AllocationFailed(format!("Failed to {operation}: {result:?}"))
        }
        vk::Result::ERROR_FORMAT_NOT_SUPPORTED | vk::Result::ERROR_FEATURE_NOT_PRESENT => {
            GraphicsError::ValidationFailed(format!("Failed to {operation}: {result:?}"))
        }
        _ => GraphicsError::Internal(format!("Failed to {operation}: {result:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage() {
        let flags = convert_buffer_usage(
            BufferUsage::UNIFORM | BufferUsage::STORAGE | BufferUsage::COPY_SRC,
        );
        assert_eq!(
            flags,
            vk::BufferUsageFlags::UNIFORM_BUFFER
                | vk::BufferUsageFlags::STORAGE_BUFFER
                | vk::BufferUsageFlags::TRANSFER_SRC
        );
        assert!(convert_buffer_usage(BufferUsage::STORAGE_TEXEL)
            .contains(vk::BufferUsageFlags::STORAGE_TEXEL_BUFFER));
    }

    #[test]
    fn test_memory_properties() {
        assert_eq!(
            convert_memory_properties(MemoryProperties::UPLOAD),
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        );
        assert_eq!(
            convert_memory_properties(MemoryProperties::DEVICE_LOCAL),
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        );
    }

    #[test]
    fn test_vk_error_mapping() {
        assert!(matches!(
            convert_vk_error("allocate", vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            GraphicsError::AllocationFailed(_)
        ));
        assert!(matches!(
            convert_vk_error("create view", vk::Result::ERROR_FORMAT_NOT_SUPPORTED),
            GraphicsError::ValidationFailed(_)
        ));
        assert!(matches!(
            convert_vk_error("bind", vk::Result::ERROR_DEVICE_LOST),
            GraphicsError::Internal(_)
        ));
    }
}
