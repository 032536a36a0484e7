//! The request surface of the filesystem.
//!
//! Every protocol request is one variant of [`Request`], answered by [`ExposeFs::dispatch`]:
//! resolve the target, hand it to the component that owns the operation, return the answer.
//! Requests share the immutable [`BackingSet`] and nothing else, so any number may run at once.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::debug;

use super::attr::AttributeProvider;
use super::io::IoBridge;
use super::resolve::NameResolver;
use super::{
    BLOCK_SIZE, DirEntry, FileHandle, FsError, FsStats, InodeAddr, OpenFlags, ResolvedTarget,
    SHARED_HANDLE, SyntheticAttributes,
};
use crate::backing::BackingSet;

/// Longest entry name the kernel will hand us.
const MAX_NAME_LENGTH: u32 = 255;

/// How a request names its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    /// An absolute path inside the mount.
    Path(PathBuf),
    /// A FUSE inode number.
    Inode(InodeAddr),
}

impl From<&Path> for Locator {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<&str> for Locator {
    fn from(path: &str) -> Self {
        Self::Path(PathBuf::from(path))
    }
}

impl From<InodeAddr> for Locator {
    fn from(ino: InodeAddr) -> Self {
        Self::Inode(ino)
    }
}

/// Requests that would change the filesystem. All of them are refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// Permission change.
    Chmod,
    /// Ownership change.
    Chown,
    /// Size change.
    Truncate,
    /// Timestamp change.
    SetTimes,
    /// Data write.
    Write,
    /// File creation.
    Create,
    /// Node creation.
    Mknod,
    /// Directory creation.
    Mkdir,
    /// File removal.
    Unlink,
    /// Directory removal.
    Rmdir,
    /// Symlink creation.
    Symlink,
    /// Rename.
    Rename,
    /// Hard link creation.
    Link,
    /// Extended attribute write.
    SetXattr,
    /// Extended attribute removal.
    RemoveXattr,
    /// Space allocation.
    Fallocate,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Chmod => "chmod",
            Self::Chown => "chown",
            Self::Truncate => "truncate",
            Self::SetTimes => "utimens",
            Self::Write => "write",
            Self::Create => "create",
            Self::Mknod => "mknod",
            Self::Mkdir => "mkdir",
            Self::Unlink => "unlink",
            Self::Rmdir => "rmdir",
            Self::Symlink => "symlink",
            Self::Rename => "rename",
            Self::Link => "link",
            Self::SetXattr => "setxattr",
            Self::RemoveXattr => "removexattr",
            Self::Fallocate => "fallocate",
        };
        f.write_str(name)
    }
}

/// One protocol request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Find `name` inside the directory `parent`.
    Lookup {
        /// The directory being searched.
        parent: InodeAddr,
        /// The entry name.
        name: OsString,
    },
    /// Fetch metadata.
    GetAttributes {
        /// The target.
        at: Locator,
    },
    /// Open a file (or the root, read-only).
    Open {
        /// The target.
        at: Locator,
        /// open(2) flags.
        flags: OpenFlags,
    },
    /// Open a directory for listing.
    OpenDirectory {
        /// The target.
        at: Locator,
    },
    /// Read `size` bytes at `offset`.
    Read {
        /// The target.
        at: Locator,
        /// Byte offset, as the protocol delivers it.
        offset: i64,
        /// Maximum number of bytes to return.
        size: u32,
    },
    /// List a directory.
    ReadDirectory {
        /// The target.
        at: Locator,
        /// How many listing items to skip, as the protocol delivers it.
        offset: i64,
    },
    /// Close a handle obtained from `Open` or `OpenDirectory`.
    Release {
        /// The handle being closed.
        fh: FileHandle,
    },
    /// Filesystem statistics.
    StatFs,
    /// Anything that would change the filesystem.
    Mutate(MutationKind),
}

/// The successful answer to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// For `Lookup` and `GetAttributes`.
    Attributes(SyntheticAttributes),
    /// For `Open` and `OpenDirectory`.
    Opened(FileHandle),
    /// For `Read`. May be shorter than requested, and empty at end-of-resource.
    Data(Bytes),
    /// For `ReadDirectory`: the remaining items, each with the offset that resumes after it.
    Directory(Vec<(u64, DirEntry)>),
    /// For `Release`.
    Released,
    /// For `StatFs`.
    Stats(FsStats),
}

/// The read-only filesystem over a [`BackingSet`].
#[derive(Debug)]
pub struct ExposeFs {
    set: BackingSet,
}

impl ExposeFs {
    /// Serve `set`. The set is owned until the filesystem is dropped, after unmount.
    #[must_use]
    pub fn new(set: BackingSet) -> Self {
        Self { set }
    }

    /// The backing resources being served.
    #[must_use]
    pub fn backing_set(&self) -> &BackingSet {
        &self.set
    }

    /// Path and inode resolution.
    #[must_use]
    pub fn resolver(&self) -> NameResolver<'_> {
        NameResolver::new(&self.set)
    }

    /// Attribute synthesis.
    #[must_use]
    pub fn attributes(&self) -> AttributeProvider<'_> {
        AttributeProvider::new(&self.set)
    }

    /// Reads and listing.
    #[must_use]
    pub fn io(&self) -> IoBridge<'_> {
        IoBridge::new(&self.set)
    }

    /// Resolve a path inside the mount.
    #[must_use]
    pub fn resolve(&self, path: impl AsRef<Path>) -> ResolvedTarget {
        self.resolver().resolve(path.as_ref())
    }

    fn locate(&self, at: &Locator) -> ResolvedTarget {
        match at {
            Locator::Path(path) => self.resolver().resolve(path),
            Locator::Inode(ino) => self.resolver().resolve_inode(*ino),
        }
    }

    /// Statistics for the whole mount. Nothing is ever free.
    #[must_use]
    pub fn statfs(&self) -> FsStats {
        let block_size = u64::from(BLOCK_SIZE);
        let total_blocks = self
            .set
            .iter()
            .map(|entry| entry.current_size().div_ceil(block_size))
            .sum();

        FsStats {
            block_size: BLOCK_SIZE,
            total_blocks,
            free_blocks: 0,
            available_blocks: 0,
            total_inodes: self.set.len() as u64 + 1,
            free_inodes: 0,
            max_filename_length: MAX_NAME_LENGTH,
        }
    }

    /// Answer one request.
    pub fn dispatch(&self, request: Request) -> Result<Response, FsError> {
        match request {
            Request::Lookup { parent, name } => {
                let target = match self.resolver().resolve_inode(parent) {
                    ResolvedTarget::Root => self.resolver().resolve_name(&name),
                    ResolvedTarget::Entry(_) => return Err(FsError::NotADirectory),
                    ResolvedTarget::NotFound => return Err(FsError::NotFound),
                };
                self.attributes()
                    .attributes_for(target)
                    .map(Response::Attributes)
            }
            Request::GetAttributes { at } => self
                .attributes()
                .attributes_for(self.locate(&at))
                .map(Response::Attributes),
            Request::Open { at, flags } => {
                self.io().open(self.locate(&at), flags).map(Response::Opened)
            }
            Request::OpenDirectory { at } => match self.locate(&at) {
                ResolvedTarget::Root => Ok(Response::Opened(SHARED_HANDLE)),
                ResolvedTarget::Entry(_) => Err(FsError::NotADirectory),
                ResolvedTarget::NotFound => Err(FsError::NotFound),
            },
            Request::Read { at, offset, size } => {
                let start = u64::try_from(offset).map_err(|_| FsError::InvalidOffset(offset))?;
                self.io()
                    .read_bytes(self.locate(&at), start, size)
                    .map(Response::Data)
            }
            Request::ReadDirectory { at, offset } => {
                let start = u64::try_from(offset).map_err(|_| FsError::InvalidOffset(offset))?;
                self.io()
                    .list_directory_from(self.locate(&at), start)
                    .map(Response::Directory)
            }
            Request::Release { .. } => Ok(Response::Released),
            Request::StatFs => Ok(Response::Stats(self.statfs())),
            Request::Mutate(kind) => {
                debug!(%kind, "rejecting mutation on read-only filesystem");
                Err(FsError::Unsupported(kind))
            }
        }
    }
}
