//! Packed write/read cursor: a 64-bit word combining a cycle counter with a
//! byte offset into the ring.
//!
//! The high 32 bits count completed trips around the ring (the cycle), the
//! low 32 bits are the byte offset of the next frame. Publishing a frame is
//! a single 64-bit release store of the new cursor; readers acquire-load the
//! cursor before touching frame bytes, which gives them a happens-before
//! edge with every byte written for frames at or before that cursor.

use std::sync::atomic::{AtomicU64, Ordering};

/// A cycle + offset pair packed into one atomically publishable word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PackedCursor(u64);

impl PackedCursor {
    #[inline(always)]
    pub const fn new(cycle: u32, offset: u32) -> Self {
        Self(((cycle as u64) << 32) | offset as u64)
    }

    #[inline(always)]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline(always)]
    pub const fn cycle(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline(always)]
    pub const fn offset(self) -> u32 {
        self.0 as u32
    }

    #[inline(always)]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Advance the cursor by `delta` bytes within a ring of `segment_size`
    /// bytes, incrementing the cycle when the end of the ring is reached.
    #[inline(always)]
    pub fn wrap_add(self, delta: u32, segment_size: u32) -> Self {
        let sum = self.offset() as u64 + delta as u64;
        if sum >= segment_size as u64 {
            Self::new(self.cycle().wrapping_add(1), (sum - segment_size as u64) as u32)
        } else {
            Self::new(self.cycle(), sum as u32)
        }
    }

    /// Acquire-capable load from a shared cursor word.
    #[inline(always)]
    pub fn load(cell: &AtomicU64, order: Ordering) -> Self {
        Self(cell.load(order))
    }

    /// Release-capable store to a shared cursor word.
    #[inline(always)]
    pub fn store(self, cell: &AtomicU64, order: Ordering) {
        cell.store(self.0, order);
    }
}
