use memmap2::MmapMut;
use std::{
    fs::{File, OpenOptions},
    io,
    path::Path,
};

/// A file-backed, read-write shared mapping.
///
/// The file handle is kept alive for the lifetime of the mapping so the
/// backing inode survives an unlink by another process.
#[derive(Debug)]
pub struct MappedFileMut {
    _file: File,
    mmap: MmapMut,
}

impl MappedFileMut {
    /// Open `path`, creating it if it does not exist, and map it read-write
    /// shared.
    ///
    /// A freshly created (zero-length) file is grown to `size_bytes`; the
    /// kernel zero-fills the extension. An existing file is mapped at its
    /// current length without truncation, so concurrent openers never wipe
    /// each other's state. Returns the mapping and whether this call created
    /// the file.
    pub fn open_or_create_rw<P: AsRef<Path>>(path: P, size_bytes: u64) -> io::Result<(Self, bool)> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        let created = file.metadata()?.len() == 0;
        if created {
            file.set_len(size_bytes)?;
        }

        let mmap = unsafe { MmapMut::map_mut(&file)? };
        Ok((Self { _file: file, mmap }, created))
    }

    /// Return raw pointer to start of memory mapped file data
    #[inline]
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.mmap.as_mut_ptr()
    }

    #[inline]
    pub fn as_ptr(&self) -> *const u8 {
        self.mmap.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mmap.len() == 0
    }
}
