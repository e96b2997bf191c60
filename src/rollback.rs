//! A fixed-capacity, call-frame rollback journal.
//!
//! The distilled spec calls for "a simple fixed-capacity rollback journal on
//! the call frame" (§9) to undo partial block allocation when a multi-step
//! operation (mkdir, write, rename) fails partway through. `heapless::Vec`
//! is already part of the teacher's dependency stack (`kernel/Cargo.toml`)
//! and is exactly that vessel: a `Vec`-shaped container with no heap
//! allocation, living entirely on the stack frame that owns it.

use heapless::Vec as HVec;

use crate::arena::Arena;
use crate::error::{Error, Result};

/// Journal capacity. Large enough for any single write spanning a few
/// hundred newly allocated data and extent-table blocks; an operation that
/// would overrun it fails closed with `Error::JournalFull` rather than
/// silently leaking the bookkeeping needed to unwind it.
pub const JOURNAL_CAPACITY: usize = 256;

/// Records every block this call allocates, in order, so [`Rollback::undo`]
/// can free them all if the operation doesn't reach a committed state.
pub struct Rollback {
    allocated: HVec<u32, JOURNAL_CAPACITY>,
}

impl Rollback {
    pub fn new() -> Self {
        Rollback {
            allocated: HVec::new(),
        }
    }

    /// Allocates a block and records it for rollback.
    pub fn allocate(&mut self, arena: &mut Arena<'_>) -> Result<u32> {
        let block = arena.allocate_block()?;
        if self.allocated.push(block).is_err() {
            arena.free_block(block);
            return Err(Error::JournalFull);
        }
        Ok(block)
    }

    /// Frees every block recorded so far, in reverse allocation order.
    /// Called on any failure path once the operation has decided not to
    /// commit.
    pub fn undo(self, arena: &mut Arena<'_>) {
        for block in self.allocated.iter().rev() {
            arena.free_block(*block);
        }
    }

    /// Discards the journal without freeing anything: the operation
    /// succeeded and every recorded block is now part of the committed
    /// state.
    pub fn commit(self) {}
}

impl Default for Rollback {
    fn default() -> Self {
        Self::new()
    }
}
