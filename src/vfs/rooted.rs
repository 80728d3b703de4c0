// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Filesystem backend rooted at a directory.
//!
//! Every path argument is resolved inside the root: absolute paths are
//! re-anchored at it and `..` cannot climb above it. NUL bytes and empty
//! paths are refused before anything touches the disk.
//!
//! Abort cleanup policy: when the engine releases a write stream early the
//! handle is dropped and the partially written file is preserved.

use std::{
    ffi::OsStr,
    fs::{self, File, OpenOptions},
    io::{self, Read, Write},
    os::unix::ffi::OsStrExt,
    path::{Component, Path, PathBuf},
    time::UNIX_EPOCH,
};

use tracing::debug;

use crate::backend::fs::{DirEntry, EntryKind, Fs, FsError};

pub struct RootedFs {
    root: PathBuf,
}

/// Working directory as a normalised path relative to the root.
pub struct WorkDir {
    rel: PathBuf,
}

pub struct DirStream {
    inner: fs::ReadDir,
    /// Staging for the current entry name; the yielded slice borrows it.
    name: Vec<u8>,
}

fn map_err(err: &io::Error) -> FsError {
    match err.kind() {
        io::ErrorKind::NotFound => FsError::NotFound,
        io::ErrorKind::PermissionDenied => FsError::PermissionDenied,
        io::ErrorKind::AlreadyExists => FsError::Exists,
        io::ErrorKind::NotADirectory => FsError::NotDir,
        io::ErrorKind::IsADirectory => FsError::IsDir,
        io::ErrorKind::StorageFull => FsError::NoSpace,
        io::ErrorKind::ReadOnlyFilesystem => FsError::ReadOnly,
        io::ErrorKind::InvalidInput => FsError::InvalidPath,
        _ => FsError::Io,
    }
}

impl RootedFs {
    /// `root` must exist and be a directory; it is canonicalised once and
    /// never re-resolved.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, FsError> {
        let root = root.as_ref().canonicalize().map_err(|e| map_err(&e))?;
        if !root.is_dir() {
            return Err(FsError::NotDir);
        }
        Ok(Self { root })
    }

    /// Joins `path` onto `base` (itself root-relative) without ever leaving
    /// the root.
    fn resolve(&self, base: &Path, path: &[u8]) -> Result<PathBuf, FsError> {
        if path.is_empty() || path.contains(&0) {
            return Err(FsError::InvalidPath);
        }
        let raw = Path::new(OsStr::from_bytes(path));
        let mut rel = if raw.is_absolute() {
            PathBuf::new()
        } else {
            base.to_path_buf()
        };
        for comp in raw.components() {
            match comp {
                Component::RootDir | Component::CurDir => {}
                // Popping a root-relative path can never escape the root.
                Component::ParentDir => {
                    rel.pop();
                }
                Component::Normal(part) => rel.push(part),
                Component::Prefix(_) => return Err(FsError::InvalidPath),
            }
        }
        Ok(rel)
    }

    fn full(&self, rel: &Path) -> PathBuf {
        self.root.join(rel)
    }
}

impl Fs for RootedFs {
    type Dir = WorkDir;
    type DirIter = DirStream;
    type FileRead = File;
    type FileWrite = File;

    const SUPPORTS_MKD: bool = true;
    const SUPPORTS_RMD: bool = true;
    const SUPPORTS_SIZE: bool = true;
    const SUPPORTS_MDTM: bool = true;

    fn cwd_init(&mut self) -> Result<WorkDir, FsError> {
        Ok(WorkDir { rel: PathBuf::new() })
    }

    fn cwd_pwd<'a>(
        &mut self,
        dir: &WorkDir,
        out: &'a mut [u8],
    ) -> Result<&'a [u8], FsError> {
        let bytes = dir.rel.as_os_str().as_bytes();
        let total = 1 + bytes.len();
        if total > out.len() {
            return Err(FsError::Io);
        }
        out[0] = b'/';
        out[1..total].copy_from_slice(bytes);
        Ok(&out[..total])
    }

    fn cwd_change(&mut self, dir: &mut WorkDir, path: &[u8]) -> Result<(), FsError> {
        let rel = self.resolve(&dir.rel, path)?;
        let meta = fs::metadata(self.full(&rel)).map_err(|e| map_err(&e))?;
        if !meta.is_dir() {
            return Err(FsError::NotDir);
        }
        dir.rel = rel;
        Ok(())
    }

    fn cwd_up(&mut self, dir: &mut WorkDir) -> Result<(), FsError> {
        // At the root this is a no-op, matching common server behaviour.
        dir.rel.pop();
        Ok(())
    }

    fn dir_open(
        &mut self,
        dir: &WorkDir,
        path: Option<&[u8]>,
    ) -> Result<DirStream, FsError> {
        let rel = match path {
            Some(p) => self.resolve(&dir.rel, p)?,
            None => dir.rel.clone(),
        };
        let inner = fs::read_dir(self.full(&rel)).map_err(|e| map_err(&e))?;
        Ok(DirStream { inner, name: Vec::new() })
    }

    fn dir_next<'a>(
        &mut self,
        iter: &'a mut DirStream,
    ) -> Result<Option<DirEntry<'a>>, FsError> {
        let entry = match iter.inner.next() {
            None => return Ok(None),
            Some(Err(err)) => return Err(map_err(&err)),
            Some(Ok(entry)) => entry,
        };
        let meta = entry.metadata().map_err(|e| map_err(&e))?;
        let name = entry.file_name();
        iter.name.clear();
        iter.name.extend_from_slice(name.as_bytes());
        let kind = if meta.is_dir() { EntryKind::Dir } else { EntryKind::File };
        let size = (kind == EntryKind::File).then(|| meta.len());
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64);
        Ok(Some(DirEntry { name: &iter.name, kind, size, mtime }))
    }

    fn dir_close(&mut self, iter: DirStream) {
        drop(iter);
    }

    fn open_read(&mut self, dir: &WorkDir, path: &[u8]) -> Result<File, FsError> {
        let rel = self.resolve(&dir.rel, path)?;
        let full = self.full(&rel);
        let meta = fs::metadata(&full).map_err(|e| map_err(&e))?;
        if meta.is_dir() {
            return Err(FsError::IsDir);
        }
        File::open(full).map_err(|e| map_err(&e))
    }

    fn open_write(&mut self, dir: &WorkDir, path: &[u8]) -> Result<File, FsError> {
        let rel = self.resolve(&dir.rel, path)?;
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.full(&rel))
            .map_err(|e| map_err(&e))
    }

    fn read(&mut self, file: &mut File, buf: &mut [u8]) -> Result<usize, FsError> {
        file.read(buf).map_err(|e| map_err(&e))
    }

    fn write(&mut self, file: &mut File, data: &[u8]) -> Result<usize, FsError> {
        file.write(data).map_err(|e| map_err(&e))
    }

    fn close_read(&mut self, file: File) {
        drop(file);
    }

    fn close_write(&mut self, file: File) {
        if let Err(err) = file.sync_all() {
            debug!(?err, "sync on close failed");
        }
    }

    fn remove(&mut self, dir: &WorkDir, path: &[u8]) -> Result<(), FsError> {
        let rel = self.resolve(&dir.rel, path)?;
        fs::remove_file(self.full(&rel)).map_err(|e| map_err(&e))
    }

    fn rename(&mut self, dir: &WorkDir, from: &[u8], to: &[u8]) -> Result<(), FsError> {
        let from = self.resolve(&dir.rel, from)?;
        let to = self.resolve(&dir.rel, to)?;
        fs::rename(self.full(&from), self.full(&to)).map_err(|e| map_err(&e))
    }

    fn make_dir(&mut self, dir: &WorkDir, path: &[u8]) -> Result<(), FsError> {
        let rel = self.resolve(&dir.rel, path)?;
        fs::create_dir(self.full(&rel)).map_err(|e| map_err(&e))
    }

    fn remove_dir(&mut self, dir: &WorkDir, path: &[u8]) -> Result<(), FsError> {
        let rel = self.resolve(&dir.rel, path)?;
        fs::remove_dir(self.full(&rel)).map_err(|e| map_err(&e))
    }

    fn file_size(&mut self, dir: &WorkDir, path: &[u8]) -> Result<u64, FsError> {
        let rel = self.resolve(&dir.rel, path)?;
        let meta = fs::metadata(self.full(&rel)).map_err(|e| map_err(&e))?;
        if meta.is_dir() {
            return Err(FsError::IsDir);
        }
        Ok(meta.len())
    }

    fn file_mtime(&mut self, dir: &WorkDir, path: &[u8]) -> Result<i64, FsError> {
        let rel = self.resolve(&dir.rel, path)?;
        let meta = fs::metadata(self.full(&rel)).map_err(|e| map_err(&e))?;
        let modified = meta.modified().map_err(|e| map_err(&e))?;
        match modified.duration_since(UNIX_EPOCH) {
            Ok(d) => Ok(d.as_secs() as i64),
            // Pre-epoch timestamps surface as negative and map to a 451
            // upstream.
            Err(_) => Ok(-1),
        }
    }
}
