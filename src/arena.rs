//! C1 — lazy arena initialization and the superblock handle.
//!
//! Grounded on the teacher's `drivers/fs/ext2/init.rs`: check the magic,
//! and if absent, lay out a fresh filesystem field by field and stamp the
//! root directory in place before returning.

use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::layout::{
    InodeRecord, Kind, SuperBlock, BLOCK_SIZE, MAGIC, NO_BLOCK, SUPERBLOCK_BYTES,
};

/// Minimum arena size able to hold a superblock, a one-byte bitmap, and a
/// root inode block — two usable blocks after metadata.
const MIN_ARENA_BLOCKS: u32 = 2;

/// A live handle over an arena's bytes plus its cached superblock.
///
/// All thirteen operations in [`crate::ops`] go through this handle; it is
/// the only place `Error::ArenaTooSmall`/`Error::BadMagic` are produced.
pub struct Arena<'a> {
    bytes: &'a mut [u8],
    superblock: SuperBlock,
}

fn now_parts() -> (i64, u32) {
    let dur = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (dur.as_secs() as i64, dur.subsec_nanos())
}

fn div_ceil(n: u32, d: u32) -> u32 {
    (n + d - 1) / d
}

impl<'a> Arena<'a> {
    /// Opens an already-initialized arena, or initializes a zero-filled one
    /// in place. Never modifies an arena whose magic already matches.
    pub fn ensure_initialized(bytes: &'a mut [u8]) -> Result<Self> {
        if bytes.len() < BLOCK_SIZE {
            return Err(Error::ArenaTooSmall);
        }
        let existing = SuperBlock::read_from(&bytes[..BLOCK_SIZE])?;
        if existing.magic == MAGIC {
            trace!("arena already initialized: {} blocks", existing.block_count);
            return Ok(Arena {
                bytes,
                superblock: existing,
            });
        }
        Self::initialize(bytes)
    }

    fn initialize(bytes: &'a mut [u8]) -> Result<Self> {
        let total_size = bytes.len() as u64;
        let block_count = (bytes.len() / BLOCK_SIZE) as u32;
        if block_count < MIN_ARENA_BLOCKS {
            return Err(Error::ArenaTooSmall);
        }
        let bitmap_bytes = div_ceil(block_count, 8);
        let bitmap_offset = SUPERBLOCK_BYTES as u32;
        let metadata_end = bitmap_offset + bitmap_bytes;
        let metadata_blocks = div_ceil(metadata_end, BLOCK_SIZE as u32);
        if metadata_blocks >= block_count {
            return Err(Error::ArenaTooSmall);
        }

        let superblock = SuperBlock {
            magic: MAGIC,
            block_size: BLOCK_SIZE as u32,
            block_count,
            free_blocks: block_count,
            bitmap_offset,
            bitmap_bytes,
            root_inode_block: NO_BLOCK,
            total_size,
        };

        let mut arena = Arena { bytes, superblock };
        arena.zero_bitmap();
        for idx in 0..metadata_blocks {
            arena.mark_allocated(idx);
        }

        let root_block = arena
            .first_free_block()
            .ok_or(Error::ArenaTooSmall)?;
        arena.mark_allocated(root_block);
        arena.superblock.root_inode_block = root_block;
        arena.superblock.free_blocks = arena.superblock.block_count - metadata_blocks - 1;

        let root = InodeRecord::new(b"/", Kind::Directory, now_parts())?;
        root.write_to(arena.block_at_mut(root_block));
        arena.flush_superblock();
        debug!(
            "initialized arena: {} blocks, root at block {}",
            block_count, root_block
        );
        Ok(arena)
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    pub fn root_block(&self) -> u32 {
        self.superblock.root_inode_block
    }

    pub fn block_count(&self) -> u32 {
        self.superblock.block_count
    }

    pub fn free_blocks(&self) -> u32 {
        self.superblock.free_blocks
    }

    pub fn set_free_blocks(&mut self, value: u32) {
        self.superblock.free_blocks = value;
        self.flush_superblock();
    }

    pub fn flush_superblock(&mut self) {
        self.superblock.write_to(&mut self.bytes[..BLOCK_SIZE]);
    }

    fn zero_bitmap(&mut self) {
        let (off, len) = self.bitmap_range();
        self.bytes[off..off + len].fill(0);
    }

    pub fn bitmap_range(&self) -> (usize, usize) {
        (
            self.superblock.bitmap_offset as usize,
            self.superblock.bitmap_bytes as usize,
        )
    }

    pub fn bitmap(&self) -> &[u8] {
        let (off, len) = self.bitmap_range();
        &self.bytes[off..off + len]
    }

    pub fn bitmap_mut(&mut self) -> &mut [u8] {
        let (off, len) = self.bitmap_range();
        &mut self.bytes[off..off + len]
    }

    fn is_allocated(&self, idx: u32) -> bool {
        let byte = self.bitmap()[(idx / 8) as usize];
        byte & (1 << (idx % 8)) != 0
    }

    fn mark_allocated(&mut self, idx: u32) {
        let bitmap = self.bitmap_mut();
        bitmap[(idx / 8) as usize] |= 1 << (idx % 8);
    }

    fn first_free_block(&self) -> Option<u32> {
        (0..self.superblock.block_count).find(|&idx| !self.is_allocated(idx))
    }

    pub fn block_offset(&self, idx: u32) -> usize {
        idx as usize * BLOCK_SIZE
    }

    pub fn block_at(&self, idx: u32) -> &[u8] {
        let off = self.block_offset(idx);
        &self.bytes[off..off + BLOCK_SIZE]
    }

    pub fn block_at_mut(&mut self, idx: u32) -> &mut [u8] {
        let off = self.block_offset(idx);
        &mut self.bytes[off..off + BLOCK_SIZE]
    }

    pub fn zero_block(&mut self, idx: u32) {
        self.block_at_mut(idx).fill(0);
    }

    /// Lowest-indexed free block: sets its bit, zero-fills it, decrements
    /// the free count. `Error::OutOfSpace` when the bitmap has no zero bits.
    pub fn allocate_block(&mut self) -> Result<u32> {
        let idx = self.first_free_block().ok_or(Error::OutOfSpace)?;
        self.mark_allocated(idx);
        self.zero_block(idx);
        self.superblock.free_blocks -= 1;
        self.flush_superblock();
        trace!("allocated block {idx}");
        Ok(idx)
    }

    /// Clears the bit and zero-fills. Freeing an already-free block is a
    /// caller bug, flagged loudly in debug builds rather than silently
    /// accepted.
    pub fn free_block(&mut self, idx: u32) {
        debug_assert!(self.is_allocated(idx), "double free of block {idx}");
        if !self.is_allocated(idx) {
            warn!("ignoring free of already-free block {idx}");
            return;
        }
        self.zero_block(idx);
        let bitmap = self.bitmap_mut();
        bitmap[(idx / 8) as usize] &= !(1 << (idx % 8));
        self.superblock.free_blocks += 1;
        self.flush_superblock();
        trace!("freed block {idx}");
    }
}
