//! Internal error taxonomy and its mapping onto POSIX errno values.

use thiserror::Error;

/// Everything that can go wrong resolving a path or mutating the arena.
///
/// Mirrors the two-tier shape used throughout: operations return this rich
/// enum internally, and the public API collapses it to an [`Errno`] at the
/// boundary, the way a syscall collapses a kernel error to a single `int`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("arena is smaller than the minimum addressable layout")]
    ArenaTooSmall,
    #[error("path component not found")]
    NotFound,
    #[error("path component exists but is not a directory")]
    NotADirectory,
    #[error("expected a file, found a directory")]
    IsADirectory,
    #[error("name already exists in this directory")]
    AlreadyExists,
    #[error("directory is not empty")]
    NotEmpty,
    #[error("no free inodes remain")]
    OutOfInodes,
    #[error("no free blocks remain")]
    OutOfSpace,
    #[error("path exceeds the maximum component or depth limit")]
    NameTooLong,
    #[error("too many symlink or `..` hops while resolving a path")]
    PathTooDeep,
    #[error("offset or length is out of range for this file")]
    InvalidRange,
    #[error("rollback journal is full for this operation")]
    JournalFull,
    #[error("operation not permitted on the root directory")]
    RootOperation,
    #[error("argument was structurally invalid")]
    InvalidArgument,
}

/// A real POSIX errno, suitable for returning from an FFI boundary or
/// passing straight to a FUSE/9P front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Errno {
    NoEnt = libc::ENOENT,
    NotDir = libc::ENOTDIR,
    IsDir = libc::EISDIR,
    Exist = libc::EEXIST,
    NotEmpty = libc::ENOTEMPTY,
    NoSpc = libc::ENOSPC,
    NameTooLong = libc::ENAMETOOLONG,
    Loop = libc::ELOOP,
    Inval = libc::EINVAL,
    Fault = libc::EFAULT,
    Busy = libc::EBUSY,
    NoMem = libc::ENOMEM,
}

impl Errno {
    /// The raw `libc::c_int` value, for FFI boundaries that want a bare int.
    pub fn as_raw(self) -> i32 {
        self as i32
    }
}

impl From<Error> for Errno {
    fn from(err: Error) -> Self {
        match err {
            Error::ArenaTooSmall => Errno::Fault,
            Error::NotFound => Errno::NoEnt,
            Error::NotADirectory => Errno::NotDir,
            Error::IsADirectory => Errno::IsDir,
            Error::AlreadyExists => Errno::Exist,
            Error::NotEmpty => Errno::NotEmpty,
            Error::OutOfInodes | Error::OutOfSpace => Errno::NoSpc,
            Error::NameTooLong => Errno::NameTooLong,
            Error::PathTooDeep => Errno::Loop,
            Error::InvalidRange | Error::InvalidArgument => Errno::Inval,
            Error::JournalFull => Errno::NoMem,
            Error::RootOperation => Errno::Busy,
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
