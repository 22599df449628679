//! Graphics error types.

/// Errors that can occur while creating, mapping, or sub-allocating GPU buffers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphicsError {
    /// The device could not satisfy a memory request.
    #[error("allocation failed: {0}")]
    AllocationFailed(String),
    /// Usage, format, and memory property flags are inconsistent.
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    /// The buffer memory is not host-visible.
    #[error("buffer memory is not host-visible")]
    NotMappable,
    /// The buffer is already mapped.
    #[error("buffer is already mapped")]
    AlreadyMapped,
    /// No region of the upload ring can be reused this frame.
    #[error("upload ring exhausted: {requested} bytes requested from a {capacity} byte ring")]
    RingExhausted {
        /// Aligned size of the rejected request.
        requested: u64,
        /// Capacity of the ring.
        capacity: u64,
    },
    /// The streaming allocator has no backing buffer yet.
    #[error("streaming allocator is not initialized")]
    NotInitialized,
    /// Any other device failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GraphicsError {
    /// Whether the caller can recover by retrying later or correcting its usage.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::RingExhausted { .. } | Self::NotMappable | Self::AlreadyMapped
        )
    }
}
