//! C5 — the thirteen filesystem operations.
//!
//! Grounded on the teacher's `drivers/fs/ext2/open.rs` (`walk_path`,
//! `open_file`), `create_file.rs` (`create_file`, inode allocation
//! sequencing), `delete.rs` (`delete_file`, `free_inode`), and `dirs.rs`
//! (`mkdir`). Rename, statfs, getattr, and utimens have no single teacher
//! counterpart; their sequencing (resolve, check, mutate, write the inode
//! back) follows the same pattern the teacher uses everywhere else.

use log::{debug, trace};

use crate::arena::Arena;
use crate::dirent::{self, read_inode, write_inode};
use crate::error::{Error, Result};
use crate::file;
use crate::layout::{InodeRecord, Kind, BLOCK_SIZE};
use crate::path::{resolve, resolve_parent};
use crate::rollback::Rollback;

fn now_parts() -> (i64, u32) {
    use std::time::{SystemTime, UNIX_EPOCH};
    let dur = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (dur.as_secs() as i64, dur.subsec_nanos())
}

/// Fixed permission bits every inode reports, per the distilled spec's
/// Non-goal of enforcing anything beyond fixed mode bits.
const FIXED_PERM_BITS: u32 = 0o755;

/// Attribute snapshot returned by `getattr`/`open`, the Rust-native
/// counterpart of a `struct stat` subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    pub kind: Kind,
    /// `S_IFDIR | 0755` or `S_IFREG | 0755`, the only mode bits this
    /// filesystem ever reports (no permission enforcement, §1 Non-goals).
    pub mode: u32,
    /// `2 + subdirectory count` for directories (`.` plus each child's
    /// `..`), `1` for files.
    pub nlink: u32,
    pub size: u64,
    pub owner_uid: u32,
    pub atime: (i64, u32),
    pub mtime: (i64, u32),
}

impl Attr {
    fn from_inode(arena: &Arena<'_>, block: u32, inode: &InodeRecord) -> Result<Self> {
        let kind = inode.kind()?;
        let (mode, nlink) = match kind {
            Kind::Directory => {
                let subdirs = dirent::iterate(arena, block)?
                    .into_iter()
                    .filter(|(_, child)| {
                        read_inode(arena, *child)
                            .map(|i| i.kind() == Ok(Kind::Directory))
                            .unwrap_or(false)
                    })
                    .count() as u32;
                (libc::S_IFDIR as u32 | FIXED_PERM_BITS, 2 + subdirs)
            }
            Kind::File => (libc::S_IFREG as u32 | FIXED_PERM_BITS, 1),
        };
        Ok(Attr {
            kind,
            mode,
            nlink,
            size: inode.size,
            owner_uid: inode.owner_uid,
            atime: (inode.atime_sec, inode.atime_nsec),
            mtime: (inode.mtime_sec, inode.mtime_nsec),
        })
    }
}

/// One entry returned by `readdir`: a name and the block holding that
/// child's inode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: String,
    pub child_inode_block: u32,
}

/// Aggregate filesystem statistics returned by `statfs`, the Rust-native
/// counterpart of a `struct statvfs` subset. `free_blocks` and
/// `available_blocks` are reported separately even though this filesystem
/// has no reserved-for-root accounting and they are always numerically
/// equal — a host adapter mapping this onto `f_bfree`/`f_bavail` shouldn't
/// have to special-case a filesystem with no privileged reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    pub block_size: u32,
    pub block_count: u32,
    pub free_blocks: u32,
    pub available_blocks: u32,
    pub name_max: u32,
}

/// A resolved, open file, carrying the inode's block index so repeated
/// `read`/`write` calls don't re-walk the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHandle {
    block: u32,
}

fn name_bytes<'p>(name: &'p str) -> Result<&'p [u8]> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(Error::InvalidArgument);
    }
    Ok(name.as_bytes())
}

/// `getattr`: resolves `path` and returns a snapshot of its inode,
/// including the mode bits and link count a `struct stat` caller expects.
pub fn getattr(arena: &Arena<'_>, path: &str) -> Result<Attr> {
    let block = resolve(arena, path)?;
    let inode = read_inode(arena, block)?;
    Attr::from_inode(arena, block, &inode)
}

/// `readdir`: lists every live entry of the directory at `path`, touching
/// its `atime` the way a read of any kind does.
pub fn readdir(arena: &mut Arena<'_>, path: &str) -> Result<Vec<DirEntryInfo>> {
    let block = resolve(arena, path)?;
    let mut inode = read_inode(arena, block)?;
    if inode.kind()? != Kind::Directory {
        return Err(Error::NotADirectory);
    }
    let entries = dirent::iterate(arena, block)?;
    let (sec, nsec) = now_parts();
    inode.atime_sec = sec;
    inode.atime_nsec = nsec;
    write_inode(arena, block, &inode);
    Ok(entries
        .into_iter()
        .map(|(name, child)| DirEntryInfo {
            name: String::from_utf8_lossy(&name).into_owned(),
            child_inode_block: child,
        })
        .collect())
}

/// `mknod`: creates an empty regular file at `path`.
pub fn mknod(arena: &mut Arena<'_>, path: &str) -> Result<()> {
    let (parent, name) = resolve_parent(arena, path)?;
    let name = name_bytes(name)?;
    let mut rollback = Rollback::new();
    let result = (|| -> Result<()> {
        let inode_block = rollback.allocate(arena)?;
        let inode = InodeRecord::new(name, Kind::File, now_parts())?;
        write_inode(arena, inode_block, &inode);
        dirent::insert(arena, parent, name, inode_block)
    })();
    match result {
        Ok(()) => {
            rollback.commit();
            trace!("mknod {path}");
            Ok(())
        }
        Err(e) => {
            rollback.undo(arena);
            Err(e)
        }
    }
}

/// `unlink`: removes a regular file's directory entry and frees its inode
/// and data blocks. Fails `Error::IsADirectory` on a directory (use `rmdir`).
pub fn unlink(arena: &mut Arena<'_>, path: &str) -> Result<()> {
    let (parent, name) = resolve_parent(arena, path)?;
    let name = name_bytes(name)?;
    let child = dirent::lookup(arena, parent, name)?;
    let inode = read_inode(arena, child)?;
    if inode.kind()? != Kind::File {
        return Err(Error::IsADirectory);
    }
    file::truncate(arena, child, 0)?;
    dirent::remove(arena, parent, name)?;
    arena.free_block(child);
    debug!("unlink {path}");
    Ok(())
}

/// `rmdir`: removes an empty directory. Fails `Error::NotEmpty` if it has
/// any live entries, `Error::RootOperation` on the root itself.
pub fn rmdir(arena: &mut Arena<'_>, path: &str) -> Result<()> {
    let (parent, name) = resolve_parent(arena, path)?;
    let name = name_bytes(name)?;
    let child = dirent::lookup(arena, parent, name)?;
    if child == arena.root_block() {
        return Err(Error::RootOperation);
    }
    let inode = read_inode(arena, child)?;
    if inode.kind()? != Kind::Directory {
        return Err(Error::NotADirectory);
    }
    if inode.child_count != 0 {
        return Err(Error::NotEmpty);
    }
    dirent::remove(arena, parent, name)?;
    arena.free_block(child);
    debug!("rmdir {path}");
    Ok(())
}

/// `mkdir`: creates an empty directory at `path`.
pub fn mkdir(arena: &mut Arena<'_>, path: &str) -> Result<()> {
    let (parent, name) = resolve_parent(arena, path)?;
    let name = name_bytes(name)?;
    let mut rollback = Rollback::new();
    let result = (|| -> Result<()> {
        let inode_block = rollback.allocate(arena)?;
        let inode = InodeRecord::new(name, Kind::Directory, now_parts())?;
        write_inode(arena, inode_block, &inode);
        dirent::insert(arena, parent, name, inode_block)
    })();
    match result {
        Ok(()) => {
            rollback.commit();
            trace!("mkdir {path}");
            Ok(())
        }
        Err(e) => {
            rollback.undo(arena);
            Err(e)
        }
    }
}

/// `rename`: moves the entry at `from` to `to`. If `to` already exists it is
/// destroyed first (files freed outright, directories only if empty); the
/// source inode itself always survives the move unchanged. Refuses to move
/// a directory inside its own subtree. If inserting into the destination
/// directory fails (e.g. `ENOSPC` growing its dirent chain), the source
/// entry is reinserted into its original parent before the error propagates.
pub fn rename(arena: &mut Arena<'_>, from: &str, to: &str) -> Result<()> {
    let (src_parent, src_name) = resolve_parent(arena, from)?;
    let src_name = name_bytes(src_name)?;
    let src_child = dirent::lookup(arena, src_parent, src_name)?;

    let (dst_parent, dst_name) = resolve_parent(arena, to)?;
    let dst_name = name_bytes(dst_name)?;

    if dirent::lookup(arena, dst_parent, dst_name).map(|b| b == src_child).unwrap_or(false) {
        return Ok(());
    }

    let src_inode = read_inode(arena, src_child)?;
    if src_inode.kind()? == Kind::Directory && is_ancestor(arena, src_child, dst_parent)? {
        return Err(Error::InvalidArgument);
    }

    if let Ok(existing) = dirent::lookup(arena, dst_parent, dst_name) {
        let existing_inode = read_inode(arena, existing)?;
        let existing_kind = existing_inode.kind()?;
        if src_inode.kind()? == Kind::File && existing_kind == Kind::Directory {
            return Err(Error::IsADirectory);
        }
        if src_inode.kind()? == Kind::Directory && existing_kind == Kind::File {
            return Err(Error::NotADirectory);
        }
        match existing_kind {
            Kind::Directory => {
                if existing_inode.child_count != 0 {
                    return Err(Error::NotEmpty);
                }
                dirent::remove(arena, dst_parent, dst_name)?;
                arena.free_block(existing);
            }
            Kind::File => {
                file::truncate(arena, existing, 0)?;
                dirent::remove(arena, dst_parent, dst_name)?;
                arena.free_block(existing);
            }
        }
    }

    dirent::remove(arena, src_parent, src_name)?;
    if let Err(e) = dirent::insert(arena, dst_parent, dst_name, src_child) {
        dirent::insert(arena, src_parent, src_name, src_child)
            .expect("the slot just vacated in the source directory is free again");
        return Err(e);
    }
    debug!("rename {from} -> {to}");
    Ok(())
}

/// Walks upward from `candidate_ancestor`'s putative descendant `start`
/// back to the root, re-resolving via parent links each step (no stored
/// back-pointer, per the distilled spec's position-independence rule).
fn is_ancestor(arena: &Arena<'_>, candidate_ancestor: u32, start: u32) -> Result<bool> {
    if candidate_ancestor == start {
        return Ok(true);
    }
    let mut current = start;
    while current != arena.root_block() {
        let parent = find_parent_block(arena, current)?;
        if parent == candidate_ancestor {
            return Ok(true);
        }
        current = parent;
    }
    Ok(false)
}

fn find_parent_block(arena: &Arena<'_>, block: u32) -> Result<u32> {
    let mut stack = vec![arena.root_block()];
    while let Some(dir) = stack.pop() {
        for (_, child) in dirent::iterate(arena, dir)? {
            if child == block {
                return Ok(dir);
            }
            if read_inode(arena, child)?.kind()? == Kind::Directory {
                stack.push(child);
            }
        }
    }
    Err(Error::NotFound)
}

/// `truncate`: resizes the file at `path`.
pub fn truncate(arena: &mut Arena<'_>, path: &str, size: u64) -> Result<()> {
    let block = resolve(arena, path)?;
    file::truncate(arena, block, size)
}

/// `open`: resolves `path` to a regular file and returns a reusable handle.
pub fn open(arena: &Arena<'_>, path: &str) -> Result<FileHandle> {
    let block = resolve(arena, path)?;
    let inode = read_inode(arena, block)?;
    if inode.kind()? != Kind::File {
        return Err(Error::IsADirectory);
    }
    Ok(FileHandle { block })
}

/// `read`: reads through an already-`open`ed handle.
pub fn read(arena: &mut Arena<'_>, handle: FileHandle, offset: u64, buf: &mut [u8]) -> Result<usize> {
    file::read(arena, handle.block, offset, buf)
}

/// `write`: writes through an already-`open`ed handle.
pub fn write(arena: &mut Arena<'_>, handle: FileHandle, offset: u64, data: &[u8]) -> Result<usize> {
    file::write(arena, handle.block, offset, data)
}

/// `utimens`: updates the access and modification times of `path`.
pub fn utimens(arena: &mut Arena<'_>, path: &str, atime: (i64, u32), mtime: (i64, u32)) -> Result<()> {
    let block = resolve(arena, path)?;
    let mut inode = read_inode(arena, block)?;
    inode.atime_sec = atime.0;
    inode.atime_nsec = atime.1;
    inode.mtime_sec = mtime.0;
    inode.mtime_nsec = mtime.1;
    write_inode(arena, block, &inode);
    Ok(())
}

/// `statfs`: reports the arena's block geometry and free space.
pub fn statfs(arena: &Arena<'_>) -> StatFs {
    StatFs {
        block_size: BLOCK_SIZE as u32,
        block_count: arena.block_count(),
        free_blocks: arena.free_blocks(),
        available_blocks: arena.free_blocks(),
        name_max: crate::layout::NAME_MAX as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_arena(blocks: usize) -> Vec<u8> {
        vec![0u8; blocks * BLOCK_SIZE]
    }

    #[test]
    fn mknod_then_getattr() {
        let mut bytes = fresh_arena(16);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        mknod(&mut arena, "/a.txt").unwrap();
        let attr = getattr(&arena, "/a.txt").unwrap();
        assert_eq!(attr.kind, Kind::File);
        assert_eq!(attr.size, 0);
    }

    #[test]
    fn mknod_duplicate_is_rejected() {
        let mut bytes = fresh_arena(16);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        mknod(&mut arena, "/a.txt").unwrap();
        assert_eq!(mknod(&mut arena, "/a.txt"), Err(Error::AlreadyExists));
    }

    #[test]
    fn mkdir_and_readdir() {
        let mut bytes = fresh_arena(16);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        mkdir(&mut arena, "/dir").unwrap();
        mknod(&mut arena, "/dir/f").unwrap();
        let entries = readdir(&mut arena, "/dir").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "f");
    }

    #[test]
    fn readdir_touches_directory_atime() {
        let mut bytes = fresh_arena(16);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        mkdir(&mut arena, "/dir").unwrap();
        readdir(&mut arena, "/dir").unwrap();
        let attr = getattr(&arena, "/dir").unwrap();
        assert!(attr.atime.0 > 0);
    }

    #[test]
    fn unlink_removes_file_and_frees_blocks() {
        let mut bytes = fresh_arena(16);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        mknod(&mut arena, "/a.txt").unwrap();
        let handle = open(&arena, "/a.txt").unwrap();
        write(&mut arena, handle, 0, b"hello").unwrap();
        let before = arena.free_blocks();
        unlink(&mut arena, "/a.txt").unwrap();
        assert!(arena.free_blocks() > before);
        assert_eq!(getattr(&arena, "/a.txt"), Err(Error::NotFound));
    }

    #[test]
    fn rmdir_refuses_nonempty_directory() {
        let mut bytes = fresh_arena(16);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        mkdir(&mut arena, "/dir").unwrap();
        mknod(&mut arena, "/dir/f").unwrap();
        assert_eq!(rmdir(&mut arena, "/dir"), Err(Error::NotEmpty));
    }

    #[test]
    fn rmdir_refuses_root() {
        let mut bytes = fresh_arena(16);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        assert_eq!(rmdir(&mut arena, "/"), Err(Error::RootOperation));
    }

    #[test]
    fn rename_moves_entry() {
        let mut bytes = fresh_arena(16);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        mknod(&mut arena, "/a.txt").unwrap();
        mkdir(&mut arena, "/dir").unwrap();
        rename(&mut arena, "/a.txt", "/dir/b.txt").unwrap();
        assert_eq!(getattr(&arena, "/a.txt"), Err(Error::NotFound));
        assert!(getattr(&arena, "/dir/b.txt").is_ok());
    }

    #[test]
    fn rename_overwrites_destination_file() {
        let mut bytes = fresh_arena(16);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        mknod(&mut arena, "/a.txt").unwrap();
        mknod(&mut arena, "/b.txt").unwrap();
        let handle = open(&arena, "/b.txt").unwrap();
        write(&mut arena, handle, 0, b"old").unwrap();
        rename(&mut arena, "/a.txt", "/b.txt").unwrap();
        let attr = getattr(&arena, "/b.txt").unwrap();
        assert_eq!(attr.size, 0);
    }

    #[test]
    fn rename_file_over_directory_is_rejected() {
        let mut bytes = fresh_arena(16);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        mknod(&mut arena, "/a.txt").unwrap();
        mkdir(&mut arena, "/b").unwrap();
        assert_eq!(rename(&mut arena, "/a.txt", "/b"), Err(Error::IsADirectory));
    }

    #[test]
    fn rename_directory_over_file_is_rejected() {
        let mut bytes = fresh_arena(16);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        mkdir(&mut arena, "/a").unwrap();
        mknod(&mut arena, "/b.txt").unwrap();
        assert_eq!(rename(&mut arena, "/a", "/b.txt"), Err(Error::NotADirectory));
    }

    #[test]
    fn rename_refuses_moving_directory_into_its_own_subtree() {
        let mut bytes = fresh_arena(32);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        mkdir(&mut arena, "/dir").unwrap();
        mkdir(&mut arena, "/dir/child").unwrap();
        assert_eq!(
            rename(&mut arena, "/dir", "/dir/child/moved"),
            Err(Error::InvalidArgument)
        );
    }

    #[test]
    fn rename_restores_source_entry_when_destination_insert_runs_out_of_space() {
        let mut bytes = fresh_arena(64);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        mknod(&mut arena, "/src").unwrap();
        mkdir(&mut arena, "/dst").unwrap();
        // Fill /dst's one dirent block so the next insert must grow the chain.
        for i in 0..15 {
            mknod(&mut arena, &format!("/dst/f{i}")).unwrap();
        }
        // Drain every remaining block so growing the chain is impossible.
        while arena.allocate_block().is_ok() {}

        let result = rename(&mut arena, "/src", "/dst/moved");
        assert_eq!(result, Err(Error::OutOfSpace));
        // The source dirent must still be there — the failed insert must not
        // have left the filesystem with neither a source nor a destination
        // entry for the renamed inode.
        assert!(getattr(&arena, "/src").is_ok());
    }

    #[test]
    fn truncate_then_read_reflects_new_size() {
        let mut bytes = fresh_arena(16);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        mknod(&mut arena, "/a.txt").unwrap();
        let handle = open(&arena, "/a.txt").unwrap();
        write(&mut arena, handle, 0, b"hello world").unwrap();
        truncate(&mut arena, "/a.txt", 5).unwrap();
        assert_eq!(getattr(&arena, "/a.txt").unwrap().size, 5);
    }

    #[test]
    fn open_on_a_directory_is_rejected() {
        let mut bytes = fresh_arena(16);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        mkdir(&mut arena, "/dir").unwrap();
        assert_eq!(open(&arena, "/dir"), Err(Error::IsADirectory));
    }

    #[test]
    fn utimens_updates_timestamps() {
        let mut bytes = fresh_arena(16);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        mknod(&mut arena, "/a.txt").unwrap();
        utimens(&mut arena, "/a.txt", (111, 1), (222, 2)).unwrap();
        let attr = getattr(&arena, "/a.txt").unwrap();
        assert_eq!(attr.atime, (111, 1));
        assert_eq!(attr.mtime, (222, 2));
    }

    #[test]
    fn getattr_reports_mode_bits_and_link_counts() {
        let mut bytes = fresh_arena(16);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        mknod(&mut arena, "/a.txt").unwrap();
        mkdir(&mut arena, "/dir").unwrap();
        mkdir(&mut arena, "/dir/sub").unwrap();

        let file_attr = getattr(&arena, "/a.txt").unwrap();
        assert_eq!(file_attr.mode, libc::S_IFREG as u32 | 0o755);
        assert_eq!(file_attr.nlink, 1);

        let dir_attr = getattr(&arena, "/dir").unwrap();
        assert_eq!(dir_attr.mode, libc::S_IFDIR as u32 | 0o755);
        assert_eq!(dir_attr.nlink, 3); // 2 + one subdirectory

        let root_attr = getattr(&arena, "/").unwrap();
        assert_eq!(root_attr.nlink, 3); // 2 + /dir
    }

    #[test]
    fn statfs_reports_consumed_blocks() {
        let mut bytes = fresh_arena(16);
        let mut arena = Arena::ensure_initialized(&mut bytes).unwrap();
        let before = statfs(&arena).free_blocks;
        mknod(&mut arena, "/a.txt").unwrap();
        let after = statfs(&arena).free_blocks;
        assert_eq!(after, before - 1);
    }

    #[test]
    fn statfs_reports_name_max_and_matching_free_available() {
        let mut bytes = fresh_arena(16);
        let arena = Arena::ensure_initialized(&mut bytes).unwrap();
        let stats = statfs(&arena);
        assert_eq!(stats.name_max, 255);
        assert_eq!(stats.free_blocks, stats.available_blocks);
        assert_eq!(stats.block_size, BLOCK_SIZE as u32);
    }
}
