//! C3, directory half: inode lookup and the chained dirent table.
//!
//! Grounded on the teacher's `drivers/fs/ext2/dirs.rs` (`add_dir_entry`,
//! growing a directory into a new block when the current one is full) and
//! `open.rs` (`find_entry_by_name_in_block`, `find_entry_by_name_and_delete`,
//! whose swap-and-compact shape this module's `remove` reuses).

use crate::arena::Arena;
use crate::error::{Error, Result};
use crate::layout::{
    read_dirent_block, write_dirent_next, write_dirent_slot, DirEntryRecord, InodeRecord, Kind,
    NAME_FIELD, NAME_MAX, NO_BLOCK,
};

pub fn read_inode(arena: &Arena<'_>, block: u32) -> Result<InodeRecord> {
    InodeRecord::read_from(arena.block_at(block))
}

pub fn write_inode(arena: &mut Arena<'_>, block: u32, inode: &InodeRecord) {
    inode.write_to(arena.block_at_mut(block));
}

/// Finds `name` among `dir_block`'s entries and returns its child block.
pub fn lookup(arena: &Arena<'_>, dir_block: u32, name: &[u8]) -> Result<u32> {
    let inode = read_inode(arena, dir_block)?;
    if inode.kind()? != Kind::Directory {
        return Err(Error::NotADirectory);
    }
    let mut block = inode.dirent_table_block;
    while block != NO_BLOCK {
        let (slots, next) = read_dirent_block(arena.block_at(block));
        if let Some(slot) = slots.iter().find(|s| !s.is_empty() && s.name_str() == name) {
            return Ok(slot.child_inode_block);
        }
        block = next as u32;
    }
    Err(Error::NotFound)
}

/// All live entries of `dir_block`, in storage order.
pub fn iterate(arena: &Arena<'_>, dir_block: u32) -> Result<Vec<(Vec<u8>, u32)>> {
    let inode = read_inode(arena, dir_block)?;
    if inode.kind()? != Kind::Directory {
        return Err(Error::NotADirectory);
    }
    let mut out = Vec::with_capacity(inode.child_count as usize);
    let mut block = inode.dirent_table_block;
    while block != NO_BLOCK {
        let (slots, next) = read_dirent_block(arena.block_at(block));
        for slot in slots.iter() {
            if !slot.is_empty() {
                out.push((slot.name_str().to_vec(), slot.child_inode_block));
            }
        }
        block = next as u32;
    }
    Ok(out)
}

/// Adds `(name, child_block)` to `dir_block`, growing the dirent chain with
/// a freshly allocated block if every existing block is full.
/// `Error::AlreadyExists` if `name` is already present.
pub fn insert(arena: &mut Arena<'_>, dir_block: u32, name: &[u8], child_block: u32) -> Result<()> {
    if name.is_empty() || name.len() > NAME_MAX {
        return Err(Error::NameTooLong);
    }
    if lookup(arena, dir_block, name).is_ok() {
        return Err(Error::AlreadyExists);
    }
    let mut inode = read_inode(arena, dir_block)?;
    if inode.kind()? != Kind::Directory {
        return Err(Error::NotADirectory);
    }

    let mut block = inode.dirent_table_block;
    let mut prev: Option<u32> = None;
    let target_block = loop {
        if block == NO_BLOCK {
            let new_block = arena.allocate_block()?;
            match prev {
                Some(pb) => write_dirent_next(arena.block_at_mut(pb), new_block as u64),
                None => inode.dirent_table_block = new_block,
            }
            break new_block;
        }
        let (slots, next) = read_dirent_block(arena.block_at(block));
        if slots.iter().any(|s| s.is_empty()) {
            break block;
        }
        prev = Some(block);
        block = next as u32;
    };

    let (slots, _) = read_dirent_block(arena.block_at(target_block));
    let free_idx = slots
        .iter()
        .position(|s| s.is_empty())
        .expect("target block was chosen because it has a free slot");
    let mut name_field = [0u8; NAME_FIELD];
    name_field[..name.len()].copy_from_slice(name);
    let entry = DirEntryRecord {
        name: name_field,
        child_inode_block: child_block,
    };
    write_dirent_slot(arena.block_at_mut(target_block), free_idx, &entry);
    inode.child_count += 1;
    write_inode(arena, dir_block, &inode);
    Ok(())
}

/// Removes `name` from `dir_block` by swapping in the last live entry of
/// the chain and clearing its old slot, freeing the trailing block if that
/// empties it out.
pub fn remove(arena: &mut Arena<'_>, dir_block: u32, name: &[u8]) -> Result<()> {
    let mut inode = read_inode(arena, dir_block)?;
    if inode.kind()? != Kind::Directory {
        return Err(Error::NotADirectory);
    }

    let mut chain = Vec::new();
    let mut block = inode.dirent_table_block;
    while block != NO_BLOCK {
        chain.push(block);
        let (_, next) = read_dirent_block(arena.block_at(block));
        block = next as u32;
    }

    let mut target = None;
    for (ci, &b) in chain.iter().enumerate() {
        let (slots, _) = read_dirent_block(arena.block_at(b));
        if let Some(si) = slots.iter().position(|s| !s.is_empty() && s.name_str() == name) {
            target = Some((ci, si));
            break;
        }
    }
    let (target_ci, target_si) = target.ok_or(Error::NotFound)?;

    let mut last = None;
    'outer: for ci in (0..chain.len()).rev() {
        let (slots, _) = read_dirent_block(arena.block_at(chain[ci]));
        for si in (0..slots.len()).rev() {
            if !slots[si].is_empty() {
                last = Some((ci, si, slots[si]));
                break 'outer;
            }
        }
    }
    let (last_ci, last_si, last_entry) =
        last.expect("the entry just found above guarantees at least one live slot");

    if (last_ci, last_si) != (target_ci, target_si) {
        write_dirent_slot(arena.block_at_mut(chain[target_ci]), target_si, &last_entry);
    }
    write_dirent_slot(arena.block_at_mut(chain[last_ci]), last_si, &DirEntryRecord::EMPTY);
    inode.child_count -= 1;

    let last_block = chain[last_ci];
    let (remaining, _) = read_dirent_block(arena.block_at(last_block));
    if remaining.iter().all(|s| s.is_empty()) {
        if last_ci == 0 {
            inode.dirent_table_block = NO_BLOCK;
        } else {
            write_dirent_next(arena.block_at_mut(chain[last_ci - 1]), 0);
        }
        arena.free_block(last_block);
    }

    write_inode(arena, dir_block, &inode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::BLOCK_SIZE;

    fn fresh_arena(blocks: usize) -> Vec<u8> {
        vec![0u8; blocks * BLOCK_SIZE]
    }

    #[test]
    fn insert_then_lookup_round_trips() {
        let mut bytes = fresh_arena(8);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        let root = arena.root_block();
        let child = arena.allocate_block().unwrap();
        insert(&mut arena, root, b"a.txt", child).unwrap();
        assert_eq!(lookup(&arena, root, b"a.txt").unwrap(), child);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let mut bytes = fresh_arena(8);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        let root = arena.root_block();
        let child = arena.allocate_block().unwrap();
        insert(&mut arena, root, b"a.txt", child).unwrap();
        let other = arena.allocate_block().unwrap();
        assert_eq!(insert(&mut arena, root, b"a.txt", other), Err(Error::AlreadyExists));
    }

    #[test]
    fn insert_grows_into_a_second_block_past_fifteen_entries() {
        let mut bytes = fresh_arena(64);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        let root = arena.root_block();
        for i in 0..20 {
            let child = arena.allocate_block().unwrap();
            insert(&mut arena, root, format!("f{i}").as_bytes(), child).unwrap();
        }
        let entries = iterate(&arena, root).unwrap();
        assert_eq!(entries.len(), 20);
    }

    #[test]
    fn remove_compacts_and_frees_trailing_block() {
        let mut bytes = fresh_arena(64);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        let root = arena.root_block();
        for i in 0..20 {
            let child = arena.allocate_block().unwrap();
            insert(&mut arena, root, format!("f{i}").as_bytes(), child).unwrap();
        }
        let before_free = arena.free_blocks();
        for i in 15..20 {
            remove(&mut arena, root, format!("f{i}").as_bytes()).unwrap();
        }
        let entries = iterate(&arena, root).unwrap();
        assert_eq!(entries.len(), 15);
        assert!(arena.free_blocks() > before_free);
        assert_eq!(lookup(&arena, root, b"f19"), Err(Error::NotFound));
    }

    #[test]
    fn remove_missing_name_is_not_found() {
        let mut bytes = fresh_arena(8);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        let root = arena.root_block();
        assert_eq!(remove(&mut arena, root, b"nope"), Err(Error::NotFound));
    }
}
