//! On-disk binary layout of a channel segment.
//!
//! A segment file is `SegmentHeader` followed by the circular data region.
//! The layout is a cross-process contract: every field that more than one
//! process mutates is an atomic accessed with explicit ordering, and the
//! whole header is 8-aligned so cursor words never straddle cache lines.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ write_cursor │ reader_cursors[15] │ reader_uids[15]          │
//! │ num_readers  │ segment_size                                  │  header
//! ├──────────────────────────────────────────────────────────────┤
//! │ Data[segment_size]                                           │  ring
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Frames inside `Data` are 8-aligned: an 8-byte `FrameHeader` followed by
//! the payload, padded up to the next 8-byte boundary. A header with the
//! wrap flag set is a sentinel telling readers to jump to offset 0.

use std::mem::size_of;
use std::sync::atomic::{AtomicU32, AtomicU64};

/// Fixed number of reader slots per channel. Exceeding it is a hard error.
pub const NUM_READER_SLOTS: usize = 15;

/// Default data-region size for channels opened through the facade.
pub const DEFAULT_SEGMENT_SIZE: u32 = 10 * 1024 * 1024;

/// Default receive timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: i64 = 100;

/// Size of a frame header in the ring.
pub const FRAME_HEADER_SIZE: u32 = 8;

/// Frame flag: this header is a wrap sentinel, not a message.
pub const FRAME_FLAG_WRAP: u32 = 1;

/// Round `n` up to the next multiple of 8.
#[inline(always)]
pub const fn align8(n: u32) -> u32 {
    (n + 7) & !7
}

/// Bytes a payload of `len` occupies in the ring, header included.
#[inline(always)]
pub const fn framed_len(len: u32) -> u32 {
    align8(FRAME_HEADER_SIZE + len)
}

/// Segment header, mapped at offset 0 of every channel file.
///
/// `write_cursor` is owned by the single publisher. Each `reader_cursors`
/// entry is owned by the subscriber holding the matching `reader_uids` slot;
/// a uid of 0 marks a free slot. `num_readers` is the high-water mark of
/// claimed slots and `segment_size` is immutable after creation (atomic only
/// so the creation race resolves without tearing).
#[repr(C, align(8))]
pub struct SegmentHeader {
    pub write_cursor: AtomicU64,
    pub reader_cursors: [AtomicU64; NUM_READER_SLOTS],
    pub reader_uids: [AtomicU64; NUM_READER_SLOTS],
    pub num_readers: AtomicU32,
    pub segment_size: AtomicU32,
}

/// Byte length of the segment header.
pub const HEADER_SIZE: usize = size_of::<SegmentHeader>();

/// Per-frame header preceding every payload in the data region.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub size: u32,
    pub flags: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_stable() {
        // 1 write cursor + 15 reader cursors + 15 uids + two u32 counters.
        assert_eq!(HEADER_SIZE, 8 + 15 * 8 + 15 * 8 + 4 + 4);
        assert_eq!(std::mem::align_of::<SegmentHeader>(), 8);
        assert_eq!(size_of::<FrameHeader>(), 8);
    }

    #[test]
    fn align8_rounds_up() {
        assert_eq!(align8(0), 0);
        assert_eq!(align8(1), 8);
        assert_eq!(align8(8), 8);
        assert_eq!(align8(9), 16);
    }

    #[test]
    fn framed_len_includes_header_and_padding() {
        // 1-byte payload: 8 header + 1 payload, padded to 16.
        assert_eq!(framed_len(1), 16);
        // 24-byte payload packs exactly into 32.
        assert_eq!(framed_len(24), 32);
    }
}
