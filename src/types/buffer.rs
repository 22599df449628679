//! Buffer types and descriptors.

use bitflags::bitflags;

use crate::error::GraphicsError;

bitflags! {
    /// Usage flags for buffers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        /// Buffer can be used as a vertex buffer.
        const VERTEX = 1 << 0;
        /// Buffer can be used as an index buffer.
        const INDEX = 1 << 1;
        /// Buffer can be used as a uniform buffer.
        const UNIFORM = 1 << 2;
        /// Buffer can be used as a storage buffer.
        const STORAGE = 1 << 3;
        /// Buffer can be used as an indirect buffer.
        const INDIRECT = 1 << 4;
        /// Buffer can be copied from.
        const COPY_SRC = 1 << 5;
        /// Buffer can be copied to.
        const COPY_DST = 1 << 6;
        /// Buffer can back a uniform texel view.
        const UNIFORM_TEXEL = 1 << 7;
        /// Buffer can back a storage texel view.
        const STORAGE_TEXEL = 1 << 8;
    }
}

impl Default for BufferUsage {
    fn default() -> Self {
        Self::empty()
    }
}

bitflags! {
    /// Properties the backing device memory must have.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct MemoryProperties: u32 {
        /// Memory is fastest for device access.
        const DEVICE_LOCAL = 1 << 0;
        /// Memory can be mapped for CPU access.
        const HOST_VISIBLE = 1 << 1;
        /// CPU writes are visible to the device without explicit flushes.
        const HOST_COHERENT = 1 << 2;
        /// Memory is cached on the host.
        const HOST_CACHED = 1 << 3;
        /// Memory is committed lazily by the implementation.
        const LAZILY_ALLOCATED = 1 << 4;
    }
}

impl Default for MemoryProperties {
    fn default() -> Self {
        Self::DEVICE_LOCAL
    }
}

impl MemoryProperties {
    /// Host-visible, coherent memory for per-frame CPU writes.
    pub const UPLOAD: Self = Self::HOST_VISIBLE.union(Self::HOST_COHERENT);

    /// Whether memory with these properties can be mapped.
    pub fn is_mappable(self) -> bool {
        self.contains(Self::HOST_VISIBLE)
    }
}

/// Texel format of a typed buffer view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferFormat {
    R32Uint,
    R32Sint,
    R32Float,
    R16Float,
    Rg32Uint,
    Rg32Float,
    Rgba8Unorm,
    Rgba16Float,
    Rgba32Uint,
    Rgba32Float,
}

impl BufferFormat {
    /// Every format, in declaration order.
    pub const ALL: [BufferFormat; 10] = [
        Self::R32Uint,
        Self::R32Sint,
        Self::R32Float,
        Self::R16Float,
        Self::Rg32Uint,
        Self::Rg32Float,
        Self::Rgba8Unorm,
        Self::Rgba16Float,
        Self::Rgba32Uint,
        Self::Rgba32Float,
    ];

    /// Size of one texel in bytes.
    pub fn texel_size(self) -> u64 {
        match self {
            Self::R16Float => 2,
            Self::R32Uint | Self::R32Sint | Self::R32Float | Self::Rgba8Unorm => 4,
            Self::Rg32Uint | Self::Rg32Float | Self::Rgba16Float => 8,
            Self::Rgba32Uint | Self::Rgba32Float => 16,
        }
    }
}

/// Descriptor for creating a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    /// Debug label for the buffer.
    pub label: Option<String>,
    /// Size in bytes.
    pub size: u64,
    /// Usage flags.
    pub usage: BufferUsage,
    /// Required memory properties.
    pub memory_properties: MemoryProperties,
    /// Texel format; a typed view is created when set.
    pub format: Option<BufferFormat>,
}

impl BufferDescriptor {
    /// Create a new buffer descriptor backed by device-local memory.
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
            memory_properties: MemoryProperties::DEVICE_LOCAL,
            format: None,
        }
    }

    /// Set the debug label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the required memory properties.
    pub fn with_memory_properties(mut self, properties: MemoryProperties) -> Self {
        self.memory_properties = properties;
        self
    }

    /// Request a typed view with the given texel format.
    pub fn with_format(mut self, format: BufferFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Check that size, usage, format, and memory properties are consistent.
    pub fn validate(&self) -> Result<(), GraphicsError> {
        if self.size == 0 {
            return Err(GraphicsError::ValidationFailed(
                "buffer size must be greater than zero".to_string(),
            ));
        }
        if self.usage.is_empty() {
            return Err(GraphicsError::ValidationFailed(
                "buffer usage must not be empty".to_string(),
            ));
        }

        let props = self.memory_properties;
        if props.intersects(MemoryProperties::HOST_COHERENT | MemoryProperties::HOST_CACHED)
            && !props.contains(MemoryProperties::HOST_VISIBLE)
        {
            return Err(GraphicsError::ValidationFailed(format!(
                "{props:?} requires HOST_VISIBLE"
            )));
        }
        if props.contains(MemoryProperties::LAZILY_ALLOCATED | MemoryProperties::HOST_VISIBLE) {
            return Err(GraphicsError::ValidationFailed(
                "lazily allocated memory cannot be host-visible".to_string(),
            ));
        }

        if let Some(format) = self.format {
            if !self
                .usage
                .intersects(BufferUsage::UNIFORM_TEXEL | BufferUsage::STORAGE_TEXEL)
            {
                return Err(GraphicsError::ValidationFailed(format!(
                    "format {format:?} requires UNIFORM_TEXEL or STORAGE_TEXEL usage"
                )));
            }
            if self.size % format.texel_size() != 0 {
                return Err(GraphicsError::ValidationFailed(format!(
                    "size {} is not a multiple of the {format:?} texel size",
                    self.size
                )));
            }
        }

        Ok(())
    }
}

/// A byte range within a buffer, ready to be written into a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferRange<B> {
    /// Native buffer handle.
    pub buffer: B,
    /// Offset of the range in bytes.
    pub offset: u64,
    /// Length of the range in bytes.
    pub size: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_builder() {
        let desc = BufferDescriptor::new(256, BufferUsage::UNIFORM_TEXEL)
            .with_label("ray_list")
            .with_memory_properties(MemoryProperties::UPLOAD)
            .with_format(BufferFormat::R32Uint);

        assert_eq!(desc.label.as_deref(), Some("ray_list"));
        assert_eq!(desc.format, Some(BufferFormat::R32Uint));
        assert!(desc.memory_properties.is_mappable());
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn test_zero_size_rejected() {
        let desc = BufferDescriptor::new(0, BufferUsage::STORAGE);
        assert!(matches!(
            desc.validate(),
            Err(GraphicsError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_empty_usage_rejected() {
        let desc = BufferDescriptor::new(64, BufferUsage::empty());
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_coherent_without_visible_rejected() {
        let desc = BufferDescriptor::new(64, BufferUsage::STORAGE)
            .with_memory_properties(MemoryProperties::HOST_COHERENT);
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_lazy_host_visible_rejected() {
        let desc = BufferDescriptor::new(64, BufferUsage::STORAGE).with_memory_properties(
            MemoryProperties::LAZILY_ALLOCATED | MemoryProperties::HOST_VISIBLE,
        );
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_format_requires_texel_usage() {
        let desc =
            BufferDescriptor::new(64, BufferUsage::STORAGE).with_format(BufferFormat::R32Float);
        assert!(desc.validate().is_err());

        let desc = BufferDescriptor::new(64, BufferUsage::STORAGE | BufferUsage::STORAGE_TEXEL)
            .with_format(BufferFormat::R32Float);
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn test_format_size_multiple() {
        let desc = BufferDescriptor::new(20, BufferUsage::UNIFORM_TEXEL)
            .with_format(BufferFormat::Rgba32Float);
        assert!(desc.validate().is_err());
    }

    #[test]
    fn test_texel_sizes() {
        assert_eq!(BufferFormat::R16Float.texel_size(), 2);
        assert_eq!(BufferFormat::Rgba8Unorm.texel_size(), 4);
        assert_eq!(BufferFormat::Rg32Float.texel_size(), 8);
        assert_eq!(BufferFormat::Rgba32Float.texel_size(), 16);
    }
}
