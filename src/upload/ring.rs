//! Ring of upload blocks.
//!
//! ```text
//!  0                                                        capacity
//!  ┌──────────┬─────────────┬───────────────────┬────────────┐
//!  │  free    │ block (N)   │ block (N+1)       │   free     │
//!  └──────────┴─────────────┴───────────────────┴────────────┘
//!             ^ head (oldest live block)        ^ cursor
//! ```
//!
//! Blocks are kept in creation order. A new block is placed at the cursor,
//! or at offset 0 when the space up to `capacity` is too small. When neither
//! fits, the oldest block is reclaimed if its reuse delay has elapsed and
//! placement is retried; otherwise the request fails.

use std::collections::VecDeque;

/// One allocation record of the upload ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    offset: u64,
    size: u64,
    frame: u64,
    reuse_delay: u32,
}

impl Block {
    /// Start of the block in bytes.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Length of the block in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// End of the block in bytes (exclusive).
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }

    /// Frame at which the block was created.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Frames that must elapse before the block can be reused.
    pub fn reuse_delay(&self) -> u32 {
        self.reuse_delay
    }

    /// Whether the GPU can no longer be reading this block at `current_frame`.
    pub fn can_be_reused(&self, current_frame: u64) -> bool {
        current_frame.saturating_sub(self.frame) >= u64::from(self.reuse_delay)
    }
}

/// Circular list of [`Block`]s over a fixed byte range.
#[derive(Debug, Clone)]
pub struct BlockRing {
    blocks: VecDeque<Block>,
    capacity: u64,
    /// Next write position, always below `capacity`.
    cursor: u64,
    /// Sum of the sizes of all held blocks.
    live_bytes: u64,
}

impl BlockRing {
    /// Create an empty ring over `capacity` bytes.
    pub fn new(capacity: u64) -> Self {
        Self {
            blocks: VecDeque::new(),
            capacity,
            cursor: 0,
            live_bytes: 0,
        }
    }

    /// Total bytes managed by the ring.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Next write position.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Number of block records still held.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Whether the ring holds no block records.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Bytes held by all block records, reusable or not.
    pub fn live_bytes(&self) -> u64 {
        self.live_bytes
    }

    /// Block records in creation order.
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    /// Bytes held by blocks that cannot be reused at `current_frame`.
    ///
    /// Walks every block; use [`live_bytes`](Self::live_bytes) on hot paths.
    pub fn pending_bytes(&self, current_frame: u64) -> u64 {
        self.blocks
            .iter()
            .filter(|block| !block.can_be_reused(current_frame))
            .map(Block::size)
            .sum()
    }

    /// Reserve `size` contiguous bytes for a block created at `frame`.
    ///
    /// Returns the offset of the new block, or `None` when the region the
    /// block needs is still owned by a block that cannot be reused yet.
    pub fn reserve(&mut self, size: u64, frame: u64, reuse_delay: u32) -> Option<u64> {
        if size == 0 || size > self.capacity {
            return None;
        }

        loop {
            if let Some(offset) = self.find_region(size) {
                self.blocks.push_back(Block {
                    offset,
                    size,
                    frame,
                    reuse_delay,
                });
                self.cursor = (offset + size) % self.capacity;
                self.live_bytes += size;
                return Some(offset);
            }

            match self.blocks.front() {
                Some(oldest) if oldest.can_be_reused(frame) => {
                    self.live_bytes -= oldest.size;
                    self.blocks.pop_front();
                }
                _ => return None,
            }
        }
    }

    /// Offset of a free region of `size` bytes, without reclaiming anything.
    fn find_region(&self, size: u64) -> Option<u64> {
        let Some(head) = self.blocks.front().map(Block::offset) else {
            return Some(0);
        };
        let tail = self.cursor;

        if tail > head {
            // Live blocks occupy [head, tail); free space wraps around the end.
            if tail + size <= self.capacity {
                Some(tail)
            } else if size <= head {
                Some(0)
            } else {
                None
            }
        } else if tail < head {
            // Live blocks wrapped; free space is [tail, head).
            (tail + size <= head).then_some(tail)
        } else {
            // Cursor caught up with the oldest block: full.
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_reuse_boundary() {
        let block = Block {
            offset: 0,
            size: 16,
            frame: 5,
            reuse_delay: 2,
        };
        assert!(!block.can_be_reused(5));
        assert!(!block.can_be_reused(6));
        assert!(block.can_be_reused(7));
        assert!(block.can_be_reused(100));
        // A clock behind the block never reclaims it.
        assert!(!block.can_be_reused(3));
    }

    #[test]
    fn test_fill_then_reuse_after_delay() {
        let mut ring = BlockRing::new(1024);

        assert_eq!(ring.reserve(512, 0, 2), Some(0));
        assert_eq!(ring.reserve(512, 0, 2), Some(512));
        assert_eq!(ring.cursor(), 0);

        assert_eq!(ring.reserve(512, 1, 2), None);
        assert_eq!(ring.len(), 2);

        assert_eq!(ring.reserve(512, 2, 2), Some(0));
        // Only the block that was in the way got reclaimed.
        assert_eq!(ring.len(), 2);
        assert_eq!(ring.pending_bytes(2), 512);
    }

    #[test]
    fn test_wrap_skips_tail_gap() {
        let mut ring = BlockRing::new(1024);
        assert_eq!(ring.reserve(512, 0, 1), Some(0));
        assert_eq!(ring.reserve(256, 1, 1), Some(512));

        // [768, 1024) is too small for 512 bytes; the block at 0 is reusable.
        assert_eq!(ring.reserve(512, 2, 1), Some(0));
        assert_eq!(ring.cursor(), 512);
        let offsets: Vec<_> = ring.blocks().map(Block::offset).collect();
        assert_eq!(offsets, vec![512, 0]);
    }

    #[test]
    fn test_wrapped_free_space_between_tail_and_head() {
        let mut ring = BlockRing::new(1024);
        ring.reserve(256, 0, 1);
        ring.reserve(256, 0, 1);
        ring.reserve(512, 0, 1);
        // Each request reclaims only the oldest block standing in its way.
        assert_eq!(ring.reserve(256, 1, 1), Some(0));
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.reserve(128, 1, 1), Some(256));
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.cursor(), 384);
        // [384, 512) is still free in front of the 512 byte block.
        assert_eq!(ring.reserve(128, 1, 1), Some(384));
        assert_eq!(ring.len(), 4);
    }

    #[test]
    fn test_oldest_block_gates_reclaim() {
        let mut ring = BlockRing::new(256);
        assert_eq!(ring.reserve(128, 0, 3), Some(0));
        assert_eq!(ring.reserve(128, 0, 1), Some(128));

        // The second block is reusable at frame 1 but sits behind the first.
        assert_eq!(ring.reserve(128, 1, 1), None);
        assert_eq!(ring.reserve(128, 3, 1), Some(0));
    }

    #[test]
    fn test_empty_ring_restarts_at_zero() {
        let mut ring = BlockRing::new(1024);
        ring.reserve(256, 0, 1);
        ring.reserve(256, 0, 1);
        assert_eq!(ring.cursor(), 512);

        assert_eq!(ring.reserve(1024, 1, 1), Some(0));
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_oversized_and_zero_rejected() {
        let mut ring = BlockRing::new(64);
        assert_eq!(ring.reserve(0, 0, 1), None);
        assert_eq!(ring.reserve(65, 0, 1), None);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_live_bytes_tracks_push_and_reclaim() {
        let mut ring = BlockRing::new(1024);
        ring.reserve(256, 0, 1);
        ring.reserve(512, 0, 1);
        assert_eq!(ring.live_bytes(), 768);

        // Neither gap fits 512 bytes until both old blocks are reclaimed.
        assert_eq!(ring.reserve(512, 1, 1), Some(0));
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.live_bytes(), 512);

        // Failed requests leave the counter alone.
        assert_eq!(ring.reserve(1024, 1, 1), None);
        assert_eq!(ring.live_bytes(), 512);
        assert_eq!(
            ring.live_bytes(),
            ring.blocks().map(Block::size).sum::<u64>()
        );
    }

    #[test]
    fn test_pending_bytes() {
        let mut ring = BlockRing::new(1024);
        ring.reserve(128, 0, 2);
        ring.reserve(256, 1, 2);
        assert_eq!(ring.pending_bytes(1), 384);
        assert_eq!(ring.pending_bytes(2), 256);
        assert_eq!(ring.pending_bytes(3), 0);
    }
}
