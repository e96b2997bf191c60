//! An in-memory, persistence-backed, POSIX-shaped filesystem core.
//!
//! The entire filesystem lives inside one contiguous byte region — the
//! arena — handed to [`Filesystem::mount`]. Nothing the crate writes into
//! that region ever encodes a host pointer or virtual address: every
//! reference between records is a block index, so the exact same bytes can
//! be mapped at a different address later (a different process, a
//! different run) and read back identically. See `arena` for the
//! initialization routine that makes this true from the first write.

pub mod alloc;
pub mod arena;
pub mod dirent;
pub mod error;
pub mod file;
pub mod layout;
pub mod ops;
pub mod path;
pub mod rollback;

pub use error::{Error, Errno};
pub use ops::{Attr, DirEntryInfo, FileHandle, StatFs};

use arena::Arena;

/// A mounted filesystem: an initialized arena plus the thirteen operations
/// that act on it. Every mutating method takes `&mut self`, so the borrow
/// checker enforces the single-writer discipline the host adapter is
/// expected to provide (no internal locking, no concurrency control).
pub struct Filesystem<'a> {
    arena: Arena<'a>,
}

impl<'a> Filesystem<'a> {
    /// Mounts `bytes` as an arena, initializing it in place if it is still
    /// zero-filled. `Error::ArenaTooSmall` if `bytes` can't hold at least a
    /// superblock, a bitmap, and a root directory block.
    pub fn mount(bytes: &'a mut [u8]) -> error::Result<Self> {
        Ok(Filesystem {
            arena: Arena::ensure_initialized(bytes)?,
        })
    }

    pub fn getattr(&self, path: &str) -> error::Result<Attr> {
        ops::getattr(&self.arena, path)
    }

    pub fn readdir(&mut self, path: &str) -> error::Result<Vec<DirEntryInfo>> {
        ops::readdir(&mut self.arena, path)
    }

    pub fn mknod(&mut self, path: &str) -> error::Result<()> {
        ops::mknod(&mut self.arena, path)
    }

    pub fn unlink(&mut self, path: &str) -> error::Result<()> {
        ops::unlink(&mut self.arena, path)
    }

    pub fn rmdir(&mut self, path: &str) -> error::Result<()> {
        ops::rmdir(&mut self.arena, path)
    }

    pub fn mkdir(&mut self, path: &str) -> error::Result<()> {
        ops::mkdir(&mut self.arena, path)
    }

    pub fn rename(&mut self, from: &str, to: &str) -> error::Result<()> {
        ops::rename(&mut self.arena, from, to)
    }

    pub fn truncate(&mut self, path: &str, size: u64) -> error::Result<()> {
        ops::truncate(&mut self.arena, path, size)
    }

    pub fn open(&self, path: &str) -> error::Result<FileHandle> {
        ops::open(&self.arena, path)
    }

    pub fn read(&mut self, handle: FileHandle, offset: u64, buf: &mut [u8]) -> error::Result<usize> {
        ops::read(&mut self.arena, handle, offset, buf)
    }

    pub fn write(&mut self, handle: FileHandle, offset: u64, data: &[u8]) -> error::Result<usize> {
        ops::write(&mut self.arena, handle, offset, data)
    }

    pub fn utimens(
        &mut self,
        path: &str,
        atime: (i64, u32),
        mtime: (i64, u32),
    ) -> error::Result<()> {
        ops::utimens(&mut self.arena, path, atime, mtime)
    }

    pub fn statfs(&self) -> StatFs {
        ops::statfs(&self.arena)
    }
}
