//! Positioned reads against backing entries and enumeration of the root directory.

use std::ffi::OsString;
use std::fs::File;
use std::io::ErrorKind;
use std::os::unix::fs::FileExt as _;

use bytes::Bytes;

use super::{
    DirEntry, EntryKind, FileHandle, FsError, OpenFlags, ROOT_INODE, ResolvedTarget,
    SHARED_HANDLE,
};
use crate::backing::BackingSet;

/// Fill as much of `buf` as the resource holds from `offset` onward.
///
/// `read_at` may return short counts well before end-of-resource, so keep going until the
/// buffer is full or a read returns zero. The file cursor is never touched.
fn read_at_most(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let pos = offset.saturating_add(filled as u64);
        if i64::try_from(pos).is_err() {
            break;
        }

        match file.read_at(&mut buf[filled..], pos) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Open, read and readdir over the shared backing handles.
#[derive(Debug, Clone, Copy)]
pub struct IoBridge<'a> {
    set: &'a BackingSet,
}

impl<'a> IoBridge<'a> {
    /// A bridge over `set`.
    #[must_use]
    pub fn new(set: &'a BackingSet) -> Self {
        Self { set }
    }

    /// Grant access to a target.
    ///
    /// Nothing is allocated: the backing resource is already open and shared, so every caller
    /// gets [`SHARED_HANDLE`]. Entries are never locked; concurrent opens all succeed.
    pub fn open(&self, target: ResolvedTarget, flags: OpenFlags) -> Result<FileHandle, FsError> {
        match target {
            ResolvedTarget::Root if flags.wants_write() => Err(FsError::IsADirectory),
            ResolvedTarget::Root | ResolvedTarget::Entry(_) => Ok(SHARED_HANDLE),
            ResolvedTarget::NotFound => Err(FsError::NotFound),
        }
    }

    /// Read into `buf` starting at `offset`. Returns the number of bytes transferred, which is 0
    /// at or past end-of-resource.
    pub fn read(
        &self,
        target: ResolvedTarget,
        buf: &mut [u8],
        offset: u64,
    ) -> Result<usize, FsError> {
        match target {
            ResolvedTarget::Entry(index) => {
                let entry = self.set.get(index).ok_or(FsError::NotFound)?;
                Ok(read_at_most(entry.file(), buf, offset)?)
            }
            ResolvedTarget::Root => Err(FsError::IsADirectory),
            ResolvedTarget::NotFound => Err(FsError::NotFound),
        }
    }

    /// Read up to `size` bytes at `offset` into a fresh buffer.
    pub fn read_bytes(
        &self,
        target: ResolvedTarget,
        offset: u64,
        size: u32,
    ) -> Result<Bytes, FsError> {
        let mut buffer = vec![0u8; size as usize];
        let nbytes = self.read(target, &mut buffer, offset)?;
        buffer.truncate(nbytes);
        Ok(Bytes::from(buffer))
    }

    /// List the root: `.`, `..`, then every entry in [`BackingSet`] order.
    pub fn list_directory(&self, target: ResolvedTarget) -> Result<Vec<DirEntry>, FsError> {
        match target {
            ResolvedTarget::Root => {}
            ResolvedTarget::Entry(_) => return Err(FsError::NotADirectory),
            ResolvedTarget::NotFound => return Err(FsError::NotFound),
        }

        let dots = [".", ".."].into_iter().map(|name| DirEntry {
            ino: ROOT_INODE,
            name: OsString::from(name),
            kind: EntryKind::Directory,
        });
        let entries = self.set.iter().enumerate().filter_map(|(index, entry)| {
            Some(DirEntry {
                ino: ResolvedTarget::Entry(index).inode()?,
                name: entry.name().to_owned(),
                kind: EntryKind::RegularFile,
            })
        });

        Ok(dots.chain(entries).collect())
    }

    /// The listing resumed after its first `offset` items.
    ///
    /// Each item is paired with the offset that resumes right after it, so a caller that stops
    /// early can continue from the last item it accepted. Offsets past the end yield nothing.
    pub fn list_directory_from(
        &self,
        target: ResolvedTarget,
        offset: u64,
    ) -> Result<Vec<(u64, DirEntry)>, FsError> {
        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        Ok(self
            .list_directory(target)?
            .into_iter()
            .zip(1u64..)
            .skip(skip)
            .map(|(entry, next)| (next, entry))
            .collect())
    }
}
