// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Filesystem contract consumed by the protocol engine.
//!
//! The engine never touches the disk itself: every side effect goes through
//! an implementation of [`Fs`]. Backends must reject NUL bytes in path
//! arguments and confine all resolution to their sandbox; the engine
//! additionally refuses empty paths where an argument is mandatory.

use thiserror::Error;

/// Failure modes the engine consumes from a filesystem backend. Each maps
/// onto exactly one FTP reply through the table in [`crate::proto::reply`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,
    #[error("not a directory")]
    NotDir,
    #[error("is a directory")]
    IsDir,
    #[error("already exists")]
    Exists,
    #[error("permission denied")]
    PermissionDenied,
    #[error("invalid path")]
    InvalidPath,
    #[error("no space left on device")]
    NoSpace,
    #[error("read-only filesystem")]
    ReadOnly,
    #[error("filesystem i/o failure")]
    Io,
    #[error("operation not supported")]
    Unsupported,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// One directory entry. The name borrows the iterator and is valid only
/// until the next [`Fs::dir_next`] call.
#[derive(Debug)]
pub struct DirEntry<'a> {
    pub name: &'a [u8],
    pub kind: EntryKind,
    pub size: Option<u64>,
    /// Seconds since the Unix epoch, when the backend tracks it.
    pub mtime: Option<i64>,
}

/// A filesystem backend: working-directory handle, directory iteration,
/// file streams, and path operations.
///
/// The optional operations are feature-detected through the `SUPPORTS_*`
/// consts; a backend that leaves them at their defaults gets `502` replies
/// for the corresponding commands and the feature names are omitted from
/// `FEAT`.
pub trait Fs {
    type Dir;
    type DirIter;
    type FileRead;
    type FileWrite;

    const SUPPORTS_MKD: bool = false;
    const SUPPORTS_RMD: bool = false;
    const SUPPORTS_SIZE: bool = false;
    const SUPPORTS_MDTM: bool = false;

    /// Acquires the working-directory handle for a fresh session.
    fn cwd_init(&mut self) -> Result<Self::Dir, FsError>;

    /// Writes the absolute working directory into `out` and returns the
    /// filled prefix. Overflow of `out` is an `Io` failure.
    fn cwd_pwd<'a>(
        &mut self,
        dir: &Self::Dir,
        out: &'a mut [u8],
    ) -> Result<&'a [u8], FsError>;

    /// Changes the working directory, relative or absolute.
    fn cwd_change(&mut self, dir: &mut Self::Dir, path: &[u8]) -> Result<(), FsError>;

    fn cwd_up(&mut self, dir: &mut Self::Dir) -> Result<(), FsError>;

    /// Opens a directory stream at the working directory (`None`) or at
    /// `path` resolved against it.
    fn dir_open(
        &mut self,
        dir: &Self::Dir,
        path: Option<&[u8]>,
    ) -> Result<Self::DirIter, FsError>;

    /// Yields the next entry, or `None` once the stream is exhausted.
    fn dir_next<'a>(
        &mut self,
        iter: &'a mut Self::DirIter,
    ) -> Result<Option<DirEntry<'a>>, FsError>;

    fn dir_close(&mut self, iter: Self::DirIter);

    fn open_read(&mut self, dir: &Self::Dir, path: &[u8])
    -> Result<Self::FileRead, FsError>;

    /// Opens `path` for writing, truncating any existing content.
    fn open_write(
        &mut self,
        dir: &Self::Dir,
        path: &[u8],
    ) -> Result<Self::FileWrite, FsError>;

    /// A zero-length result means end of file.
    fn read(&mut self, file: &mut Self::FileRead, buf: &mut [u8])
    -> Result<usize, FsError>;

    /// Short writes are permitted; the caller resumes from the returned
    /// count.
    fn write(&mut self, file: &mut Self::FileWrite, data: &[u8])
    -> Result<usize, FsError>;

    fn close_read(&mut self, file: Self::FileRead);

    /// What happens to a file whose stream is released mid-write is backend
    /// policy; the engine only releases the handle.
    fn close_write(&mut self, file: Self::FileWrite);

    fn remove(&mut self, dir: &Self::Dir, path: &[u8]) -> Result<(), FsError>;

    fn rename(&mut self, dir: &Self::Dir, from: &[u8], to: &[u8])
    -> Result<(), FsError>;

    fn make_dir(&mut self, dir: &Self::Dir, path: &[u8]) -> Result<(), FsError> {
        let _ = (dir, path);
        Err(FsError::Unsupported)
    }

    fn remove_dir(&mut self, dir: &Self::Dir, path: &[u8]) -> Result<(), FsError> {
        let _ = (dir, path);
        Err(FsError::Unsupported)
    }

    fn file_size(&mut self, dir: &Self::Dir, path: &[u8]) -> Result<u64, FsError> {
        let _ = (dir, path);
        Err(FsError::Unsupported)
    }

    /// Modification time in seconds since the Unix epoch.
    fn file_mtime(&mut self, dir: &Self::Dir, path: &[u8]) -> Result<i64, FsError> {
        let _ = (dir, path);
        Err(FsError::Unsupported)
    }
}
