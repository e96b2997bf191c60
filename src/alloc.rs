//! C2 — block allocator.
//!
//! The bitmap itself is arena-resident state owned by [`crate::arena::Arena`]
//! (it sits right after the superblock, inside the region C1 lays out), so
//! the scan-and-flip logic lives there as inherent methods; this module is
//! the allocator's public face, named the way the component table names it.
//! Grounded on the teacher's `drivers/fs/ext2/allocator.rs`
//! (`BlockAllocator::allocate_n_blocks`, scanning for the lowest clear bit)
//! and `delete.rs`'s `free_block`.

use crate::arena::Arena;
use crate::error::Result;

/// Lowest-indexed free block: marks it allocated, zero-fills it, and
/// returns its index. `Error::OutOfSpace` when the bitmap is saturated.
pub fn allocate_block(arena: &mut Arena<'_>) -> Result<u32> {
    arena.allocate_block()
}

/// Marks a block free again and zero-fills it. Freeing a block that is
/// already free is a caller bug (checked via `debug_assert!` in the
/// underlying arena method, the teacher's convention for catching internal
/// misuse without taking down a release build).
pub fn free_block(arena: &mut Arena<'_>, idx: u32) {
    arena.free_block(idx)
}

/// Bounds-checked, read-only view of one 4096-byte block.
pub fn block_at<'a>(arena: &'a Arena<'_>, idx: u32) -> &'a [u8] {
    arena.block_at(idx)
}

/// Bounds-checked, mutable view of one 4096-byte block.
pub fn block_at_mut<'a>(arena: &'a mut Arena<'_>, idx: u32) -> &'a mut [u8] {
    arena.block_at_mut(idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::BLOCK_SIZE;

    #[test]
    fn allocate_block_zero_fills_before_returning() {
        let mut bytes = vec![0u8; 8 * BLOCK_SIZE];
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        let idx = allocate_block(&mut arena).unwrap();
        assert!(block_at(&arena, idx).iter().all(|&b| b == 0));
    }
}
