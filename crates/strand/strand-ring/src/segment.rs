//! A named, fixed-size shared-memory segment: header plus circular data
//! region, mapped read-write by every participating process.

use crate::error::{ChannelError, Result};
use crate::layout::{align8, SegmentHeader, HEADER_SIZE};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use strand_mmap::MappedFileMut;

/// An open mapping of one channel segment.
///
/// The first opener sizes the file to `HEADER_SIZE + data_size` and stamps
/// the data-region size into the header; later openers must ask for the same
/// size or fail with `SizeMismatch`. Closing unmaps but never unlinks: the
/// file's lifetime is the caller's responsibility.
#[derive(Debug)]
pub struct SharedSegment {
    /// Owns the file handle and mapping; not accessed after init.
    _mm: MappedFileMut,
    base: *mut u8,
    data_size: u32,
    path: PathBuf,
}

// Access to the mapped region goes through the atomics in `SegmentHeader`
// and through raw frame reads/writes whose visibility is ordered by the
// write cursor, so handles may move between threads and probes may observe
// the header concurrently.
unsafe impl Send for SharedSegment {}
unsafe impl Sync for SharedSegment {}

impl SharedSegment {
    /// Open the segment at `path`, creating and zero-initializing it when it
    /// does not exist. `data_size` is rounded up to 8 bytes.
    pub fn open_or_create(path: PathBuf, data_size: u32) -> Result<Self> {
        let data_size = align8(data_size);
        if data_size == 0 {
            return Err(ChannelError::InvalidArgument(
                "segment size must be non-zero".into(),
            ));
        }

        crate::paths::ensure_parent(&path)?;

        let total = HEADER_SIZE as u64 + data_size as u64;
        let (mut mm, created) = MappedFileMut::open_or_create_rw(&path, total)?;

        if mm.len() as u64 != total {
            let existing = (mm.len() as u64).saturating_sub(HEADER_SIZE as u64) as u32;
            return Err(ChannelError::SizeMismatch {
                requested: data_size,
                existing,
            });
        }

        let base = mm.as_mut_ptr();
        let segment = Self {
            _mm: mm,
            base,
            data_size,
            path,
        };

        let header = segment.header();
        if created {
            // ftruncate zero-filled the header; stamping the size marks the
            // segment initialized for every later opener.
            header.segment_size.store(data_size, Ordering::Release);
        } else {
            match header.segment_size.load(Ordering::Acquire) {
                0 => header.segment_size.store(data_size, Ordering::Release),
                existing if existing != data_size => {
                    return Err(ChannelError::SizeMismatch {
                        requested: data_size,
                        existing,
                    });
                }
                _ => {}
            }
        }

        Ok(segment)
    }

    #[inline(always)]
    pub fn header(&self) -> &SegmentHeader {
        // SAFETY: base points at a mapping of at least HEADER_SIZE bytes and
        // the header is 8-aligned at offset 0.
        unsafe { &*(self.base as *const SegmentHeader) }
    }

    /// Start of the circular data region.
    #[inline(always)]
    pub fn data_ptr(&self) -> *mut u8 {
        // SAFETY: the mapping is HEADER_SIZE + data_size bytes long.
        unsafe { self.base.add(HEADER_SIZE) }
    }

    #[inline(always)]
    pub fn data_size(&self) -> u32 {
        self.data_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_segment_path(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("strand_seg_{label}_{}", std::process::id()))
    }

    #[test]
    fn create_stamps_size_and_zeroes_header() {
        let path = temp_segment_path("create");
        let _ = std::fs::remove_file(&path);

        let seg = SharedSegment::open_or_create(path.clone(), 1024).unwrap();
        let h = seg.header();
        assert_eq!(h.segment_size.load(Ordering::Acquire), 1024);
        assert_eq!(h.write_cursor.load(Ordering::Acquire), 0);
        assert_eq!(h.num_readers.load(Ordering::Acquire), 0);
        for uid in &h.reader_uids {
            assert_eq!(uid.load(Ordering::Acquire), 0);
        }

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn reopen_with_same_size_maps_same_state() {
        let path = temp_segment_path("reopen");
        let _ = std::fs::remove_file(&path);

        let a = SharedSegment::open_or_create(path.clone(), 512).unwrap();
        a.header().write_cursor.store(42, Ordering::Release);

        let b = SharedSegment::open_or_create(path.clone(), 512).unwrap();
        assert_eq!(b.header().write_cursor.load(Ordering::Acquire), 42);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn reopen_with_different_size_is_rejected() {
        let path = temp_segment_path("mismatch");
        let _ = std::fs::remove_file(&path);

        let _a = SharedSegment::open_or_create(path.clone(), 1024).unwrap();
        match SharedSegment::open_or_create(path.clone(), 2048) {
            Err(ChannelError::SizeMismatch {
                requested,
                existing,
            }) => {
                assert_eq!(requested, 2048);
                assert_eq!(existing, 1024);
            }
            other => panic!("expected SizeMismatch, got {other:?}"),
        }

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn requested_size_is_rounded_to_eight() {
        let path = temp_segment_path("round");
        let _ = std::fs::remove_file(&path);

        let seg = SharedSegment::open_or_create(path.clone(), 100).unwrap();
        assert_eq!(seg.data_size(), 104);

        let _ = std::fs::remove_file(&path);
    }
}
