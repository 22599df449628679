//! Frame index tracking.
//!
//! The rendering context owns a [`FrameCounter`] and advances it once per
//! frame. Consumers such as the upload ring only get a [`FrameClock`], which
//! can read the current index but never change it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Owner side of the frame index.
#[derive(Debug, Default)]
pub struct FrameCounter {
    current: Arc<AtomicU64>,
}

impl FrameCounter {
    /// Create a counter starting at frame 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current frame index.
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }

    /// Advance to the next frame and return the new index.
    ///
    /// Call this once per frame, after all GPU work reading data written
    /// during the previous frame has been submitted.
    pub fn advance(&self) -> u64 {
        self.current.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Get a read-only handle to this counter.
    pub fn clock(&self) -> FrameClock {
        FrameClock {
            current: Arc::clone(&self.current),
        }
    }
}

/// Read-only view of a [`FrameCounter`].
#[derive(Debug, Clone)]
pub struct FrameClock {
    current: Arc<AtomicU64>,
}

impl FrameClock {
    /// Get the current frame index.
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }
}
