//! C4 — path splitting and resolution.
//!
//! The component iterator is adapted almost directly from the teacher's
//! `hal::path::Path`/`Components`: split on `/`, drop empty components,
//! skip `.`, and ascend on `..`. Resolution against the arena's directory
//! model (rather than returning only a normalized string) is new.

use crate::dirent;
use crate::error::{Error, Result};
use crate::layout::{Kind, NAME_MAX};
use crate::arena::Arena;

/// Borrowed, `/`-delimited path components, in order, with `.` dropped and
/// empty segments (from repeated or trailing slashes) skipped. `..` is kept
/// as a component and resolved during the walk rather than here, since
/// resolving it needs the directory tree.
pub struct Components<'p> {
    remainder: &'p str,
}

impl<'p> Components<'p> {
    pub fn new(path: &'p str) -> Self {
        Components { remainder: path }
    }
}

impl<'p> Iterator for Components<'p> {
    type Item = &'p str;

    fn next(&mut self) -> Option<&'p str> {
        loop {
            self.remainder = self.remainder.trim_start_matches('/');
            if self.remainder.is_empty() {
                return None;
            }
            let end = self.remainder.find('/').unwrap_or(self.remainder.len());
            let (component, rest) = self.remainder.split_at(end);
            self.remainder = rest;
            if component == "." {
                continue;
            }
            return Some(component);
        }
    }
}

/// Walks `path` from the root, following directory entries, and returns
/// the block index of the final component's inode.
pub fn resolve(arena: &Arena<'_>, path: &str) -> Result<u32> {
    if !path.starts_with('/') {
        return Err(Error::InvalidArgument);
    }
    let mut current = arena.root_block();
    let mut ancestors = vec![current];
    for component in Components::new(path) {
        if component.len() > NAME_MAX {
            return Err(Error::NameTooLong);
        }
        if component == ".." {
            ancestors.pop();
            current = *ancestors.last().unwrap_or(&arena.root_block());
            continue;
        }
        let inode = dirent::read_inode(arena, current)?;
        if inode.kind()? != Kind::Directory {
            return Err(Error::NotADirectory);
        }
        current = dirent::lookup(arena, current, component.as_bytes())?;
        ancestors.push(current);
    }
    Ok(current)
}

/// Splits `path` into its parent directory's block index and the final
/// component, tolerating a final component that does not yet exist (the
/// shape `mknod`/`mkdir`/`rename`'s destination need).
pub fn resolve_parent<'p>(arena: &Arena<'_>, path: &'p str) -> Result<(u32, &'p str)> {
    if !path.starts_with('/') {
        return Err(Error::InvalidArgument);
    }
    let mut components: Vec<&str> = Components::new(path).collect();
    let last = components.pop().ok_or(Error::RootOperation)?;
    if last.len() > NAME_MAX {
        return Err(Error::NameTooLong);
    }
    let mut current = arena.root_block();
    let mut ancestors = vec![current];
    for component in components {
        if component.len() > NAME_MAX {
            return Err(Error::NameTooLong);
        }
        if component == ".." {
            ancestors.pop();
            current = *ancestors.last().unwrap_or(&arena.root_block());
            continue;
        }
        let inode = dirent::read_inode(arena, current)?;
        if inode.kind()? != Kind::Directory {
            return Err(Error::NotADirectory);
        }
        current = dirent::lookup(arena, current, component.as_bytes())?;
        ancestors.push(current);
    }
    if last == ".." {
        ancestors.pop();
        current = *ancestors.last().unwrap_or(&arena.root_block());
        return Ok((current, "."));
    }
    Ok((current, last))
}
