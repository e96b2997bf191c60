//! C3, file half: the chained extent table, and read/write/truncate atop it.
//!
//! Grounded on the teacher's `drivers/fs/ext2/read.rs` (`get_block_lba`,
//! chasing indirect blocks to find the Nth data block — our extent chain is
//! the same idea with a simpler, uniform arity) and `delete.rs`
//! (`free_block`/`free_indirect_block`/`free_blocks`, the model for
//! `truncate`'s block-freeing and for tearing down an unlinked file).

use crate::arena::Arena;
use crate::dirent::{read_inode, write_inode};
use crate::error::{Error, Result};
use crate::layout::{
    read_extent_block, write_extent_slot, Kind, BLOCK_SIZE, EXTENT_DATA_SLOTS, NO_BLOCK,
};
use crate::rollback::Rollback;

/// Returns the data block holding byte `n * BLOCK_SIZE`, if it has ever been
/// written. A result of `None` past a hole is a "hole read": the caller
/// should synthesize zero bytes rather than treat it as an error (holes are
/// created by writes past the current end of file).
fn nth_data_block(arena: &Arena<'_>, extent_head: u32, n: usize) -> Option<u32> {
    let mut table = extent_head;
    let mut remaining = n;
    while table != NO_BLOCK {
        let (slots, _) = read_extent_block(arena.block_at(table));
        if remaining < EXTENT_DATA_SLOTS {
            let idx = slots[remaining];
            return if idx == 0 { None } else { Some(idx as u32) };
        }
        remaining -= EXTENT_DATA_SLOTS;
        let next = slots[EXTENT_DATA_SLOTS];
        table = next as u32;
    }
    None
}

/// Same as [`nth_data_block`] but allocates any extent table block or data
/// block missing along the way, for use by `write`. Every block it
/// allocates is recorded in `rollback` so the caller can undo a partially
/// completed write.
fn nth_data_block_mut(
    arena: &mut Arena<'_>,
    rollback: &mut Rollback,
    extent_head: &mut u32,
    n: usize,
) -> Result<u32> {
    if *extent_head == NO_BLOCK {
        *extent_head = rollback.allocate(arena)?;
    }
    let mut table = *extent_head;
    let mut remaining = n;
    loop {
        if remaining < EXTENT_DATA_SLOTS {
            let (slots, _) = read_extent_block(arena.block_at(table));
            let existing = slots[remaining];
            if existing != 0 {
                return Ok(existing as u32);
            }
            let data_block = rollback.allocate(arena)?;
            write_extent_slot(arena.block_at_mut(table), remaining, data_block as u64);
            return Ok(data_block);
        }
        remaining -= EXTENT_DATA_SLOTS;
        let (slots, _) = read_extent_block(arena.block_at(table));
        let mut next = slots[EXTENT_DATA_SLOTS] as u32;
        if next == NO_BLOCK {
            next = rollback.allocate(arena)?;
            write_extent_slot(arena.block_at_mut(table), EXTENT_DATA_SLOTS, next as u64);
        }
        table = next;
    }
}

fn now_parts() -> (i64, u32) {
    use std::time::{SystemTime, UNIX_EPOCH};
    let dur = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (dur.as_secs() as i64, dur.subsec_nanos())
}

/// Reads up to `buf.len()` bytes starting at `offset`, stopping at the
/// file's recorded size. Holes read back as zero bytes. Touches the
/// inode's `atime` on every call, successful or short.
pub fn read(arena: &mut Arena<'_>, file_block: u32, offset: u64, buf: &mut [u8]) -> Result<usize> {
    let mut inode = read_inode(arena, file_block)?;
    if inode.kind()? != Kind::File {
        return Err(Error::IsADirectory);
    }
    let done = if offset >= inode.size {
        0
    } else {
        let readable = (inode.size - offset).min(buf.len() as u64) as usize;
        let mut done = 0;
        while done < readable {
            let pos = offset as usize + done;
            let block_index = pos / BLOCK_SIZE;
            let in_block = pos % BLOCK_SIZE;
            let chunk = (BLOCK_SIZE - in_block).min(readable - done);
            match nth_data_block(arena, inode.extent_table_block, block_index) {
                Some(data_block) => {
                    let src = &arena.block_at(data_block)[in_block..in_block + chunk];
                    buf[done..done + chunk].copy_from_slice(src);
                }
                None => {
                    buf[done..done + chunk].fill(0);
                }
            }
            done += chunk;
        }
        done
    };
    let (sec, nsec) = now_parts();
    inode.atime_sec = sec;
    inode.atime_nsec = nsec;
    write_inode(arena, file_block, &inode);
    Ok(done)
}

/// Writes `data` at `offset`, growing the extent chain and `size` as
/// needed. Writing past the current size creates a hole rather than eagerly
/// allocating the blocks in between. Any block allocated while servicing
/// this write is freed again if the write fails partway through, via the
/// fixed-capacity rollback journal. A successful write touches both `atime`
/// and `mtime`.
pub fn write(arena: &mut Arena<'_>, file_block: u32, offset: u64, data: &[u8]) -> Result<usize> {
    let mut inode = read_inode(arena, file_block)?;
    if inode.kind()? != Kind::File {
        return Err(Error::IsADirectory);
    }
    let mut rollback = Rollback::new();
    match write_inner(arena, &mut rollback, &mut inode, offset, data) {
        Ok(done) => {
            let (sec, nsec) = now_parts();
            inode.atime_sec = sec;
            inode.atime_nsec = nsec;
            inode.mtime_sec = sec;
            inode.mtime_nsec = nsec;
            write_inode(arena, file_block, &inode);
            rollback.commit();
            Ok(done)
        }
        Err(e) => {
            rollback.undo(arena);
            Err(e)
        }
    }
}

fn write_inner(
    arena: &mut Arena<'_>,
    rollback: &mut Rollback,
    inode: &mut crate::layout::InodeRecord,
    offset: u64,
    data: &[u8],
) -> Result<usize> {
    let mut done = 0;
    while done < data.len() {
        let pos = offset as usize + done;
        let block_index = pos / BLOCK_SIZE;
        let in_block = pos % BLOCK_SIZE;
        let chunk = (BLOCK_SIZE - in_block).min(data.len() - done);
        let data_block =
            nth_data_block_mut(arena, rollback, &mut inode.extent_table_block, block_index)?;
        let dst = &mut arena.block_at_mut(data_block)[in_block..in_block + chunk];
        dst.copy_from_slice(&data[done..done + chunk]);
        done += chunk;
    }
    let new_size = offset + data.len() as u64;
    if new_size > inode.size {
        inode.size = new_size;
    }
    Ok(done)
}

/// Shrinks or grows a file to exactly `new_size`. Shrinking frees every
/// block whose range now exceeds `new_size` and zeroes the tail of the
/// still-retained last block; growing only extends `size` — no block is
/// allocated until something is actually written there. Always touches
/// `mtime`, the way `write` does.
pub fn truncate(arena: &mut Arena<'_>, file_block: u32, new_size: u64) -> Result<()> {
    let mut inode = read_inode(arena, file_block)?;
    if inode.kind()? != Kind::File {
        return Err(Error::IsADirectory);
    }
    let (sec, nsec) = now_parts();
    inode.mtime_sec = sec;
    inode.mtime_nsec = nsec;
    if new_size >= inode.size {
        inode.size = new_size;
        write_inode(arena, file_block, &inode);
        return Ok(());
    }

    let last_kept_block = if new_size == 0 {
        None
    } else {
        Some(((new_size - 1) / BLOCK_SIZE as u64) as usize)
    };
    // Frees every data block and extent table block past the retained
    // range in one pass; when `last_kept_block` is `None` this frees the
    // whole chain, table blocks included, so there is nothing left to tear
    // down separately below.
    free_blocks_beyond(arena, inode.extent_table_block, last_kept_block);

    if let Some(idx) = last_kept_block {
        if let Some(data_block) = nth_data_block(arena, inode.extent_table_block, idx) {
            let in_block = (new_size as usize) % BLOCK_SIZE;
            if in_block != 0 {
                arena.block_at_mut(data_block)[in_block..].fill(0);
            }
        }
    } else {
        inode.extent_table_block = NO_BLOCK;
    }

    inode.size = new_size;
    write_inode(arena, file_block, &inode);
    Ok(())
}

/// Frees every data block and extent table block strictly beyond
/// `keep_through` (inclusive index of the last block to keep; `None` means
/// free everything).
fn free_blocks_beyond(arena: &mut Arena<'_>, extent_head: u32, keep_through: Option<usize>) {
    let mut table = extent_head;
    let mut base = 0usize;
    let mut prev_table: Option<u32> = None;
    while table != NO_BLOCK {
        let (slots, _) = read_extent_block(arena.block_at(table));
        let next = slots[EXTENT_DATA_SLOTS] as u32;
        for i in 0..EXTENT_DATA_SLOTS {
            let global = base + i;
            let keep = matches!(keep_through, Some(k) if global <= k);
            if !keep && slots[i] != 0 {
                arena.free_block(slots[i] as u32);
                write_extent_slot(arena.block_at_mut(table), i, 0);
            }
        }
        let table_fully_beyond = match keep_through {
            Some(k) => base > k,
            None => true,
        };
        if table_fully_beyond {
            if let Some(pb) = prev_table {
                write_extent_slot(arena.block_at_mut(pb), EXTENT_DATA_SLOTS, 0);
            }
            arena.free_block(table);
        } else {
            prev_table = Some(table);
        }
        base += EXTENT_DATA_SLOTS;
        table = next;
    }
}
