//! The synthetic single-directory filesystem and its FUSE binding.
/// Attribute synthesis for the root directory and backing entries.
pub mod attr;
/// Request dispatch: the closed set of protocol requests and their answers.
pub mod dispatch;
/// Error taxonomy and errno mapping.
pub mod error;
/// FUSE adapter: maps [`fuser::Filesystem`] callbacks to [`dispatch::ExposeFs`].
pub mod fuser;
/// Positioned reads and directory enumeration.
pub mod io;
/// Path and inode resolution.
pub mod resolve;

pub use dispatch::{ExposeFs, Locator, MutationKind, Request, Response};
pub use error::FsError;

use std::ffi::OsString;
use std::time::SystemTime;

use bitflags::bitflags;

/// Type representing an inode identifier.
pub type InodeAddr = u64;

/// Type representing a file handle.
pub type FileHandle = u64;

/// Inode of the root directory.
pub const ROOT_INODE: InodeAddr = 1;

/// The handle granted by every successful open. No per-open state exists, so one token serves
/// every caller.
pub const SHARED_HANDLE: FileHandle = 0;

/// Block size reported for the directory and used for block accounting.
pub const BLOCK_SIZE: u32 = 4096;

bitflags! {
    /// Permission bits for an inode, similar to Unix file permissions.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InodePerms: u16 {
        /// Other: execute permission.
        const OTHER_EXECUTE = 1 << 0;
        /// Other: write permission.
        const OTHER_WRITE   = 1 << 1;
        /// Other: read permission.
        const OTHER_READ    = 1 << 2;

        /// Group: execute permission.
        const GROUP_EXECUTE = 1 << 3;
        /// Group: write permission.
        const GROUP_WRITE   = 1 << 4;
        /// Group: read permission.
        const GROUP_READ    = 1 << 5;

        /// Owner: execute permission.
        const OWNER_EXECUTE = 1 << 6;
        /// Owner: write permission.
        const OWNER_WRITE   = 1 << 7;
        /// Owner: read permission.
        const OWNER_READ    = 1 << 8;

        /// Read for owner, group and other.
        const ALL_READ = Self::OWNER_READ.bits()
            | Self::GROUP_READ.bits()
            | Self::OTHER_READ.bits();
        /// Execute (traverse, for directories) for owner, group and other.
        const ALL_EXECUTE = Self::OWNER_EXECUTE.bits()
            | Self::GROUP_EXECUTE.bits()
            | Self::OTHER_EXECUTE.bits();
    }
}

bitflags! {
    /// Flags for opening a file, similar to Unix open(2) flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: i32 {
        /// Open for reading only.
        const RDONLY = libc::O_RDONLY;
        /// Open for writing only.
        const WRONLY = libc::O_WRONLY;
        /// Open for reading and writing.
        const RDWR = libc::O_RDWR;

        /// Append on each write.
        const APPEND = libc::O_APPEND;
        /// Truncate to zero length.
        const TRUNC = libc::O_TRUNC;
        /// Create file if it does not exist.
        const CREAT = libc::O_CREAT;

        /// Non-blocking mode.
        const NONBLOCK = libc::O_NONBLOCK;
        /// Do not follow symlinks.
        const NOFOLLOW = libc::O_NOFOLLOW;
        /// Fail if not a directory.
        const DIRECTORY = libc::O_DIRECTORY;
    }
}

impl OpenFlags {
    /// Whether the access mode asks for write access.
    #[must_use]
    pub fn wants_write(self) -> bool {
        self.intersects(Self::WRONLY | Self::RDWR)
    }
}

impl From<i32> for OpenFlags {
    fn from(val: i32) -> Self {
        Self::from_bits_truncate(val)
    }
}

/// What a request's path or inode names.
///
/// Produced per request by [`resolve`]; never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolvedTarget {
    /// The synthetic root directory.
    Root,
    /// The backing entry at this position in the [`BackingSet`](crate::backing::BackingSet).
    Entry(usize),
    /// Nothing by that name.
    NotFound,
}

impl ResolvedTarget {
    /// The inode the FUSE binding uses for this target.
    #[must_use]
    pub fn inode(self) -> Option<InodeAddr> {
        match self {
            Self::Root => Some(ROOT_INODE),
            Self::Entry(index) => InodeAddr::try_from(index).ok().map(|i| i + 2),
            Self::NotFound => None,
        }
    }
}

/// The type of a node in the synthetic tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// The root directory.
    Directory,
    /// A backing entry.
    RegularFile,
}

/// Metadata computed on demand for a resolved target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SyntheticAttributes {
    /// The inode this metadata describes.
    pub ino: InodeAddr,
    /// Directory or regular file.
    pub kind: EntryKind,
    /// Fixed per kind.
    pub perm: InodePerms,
    /// Size in bytes.
    pub size: u64,
    /// Link count.
    pub nlink: u32,
    /// Owner user id.
    pub uid: u32,
    /// Owner group id.
    pub gid: u32,
    /// Timestamp reported for all of atime, mtime, ctime and crtime.
    pub time: SystemTime,
}

impl SyntheticAttributes {
    /// Number of 512-byte blocks covering `size`.
    #[must_use]
    pub fn blocks(&self) -> u64 {
        self.size.div_ceil(512)
    }
}

/// A directory listing entry. Attributes are fetched separately, on demand.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirEntry {
    /// The inode of this entry.
    pub ino: InodeAddr,
    /// The name of this entry within the root directory.
    pub name: OsString,
    /// Entry type, the only hint the listing carries.
    pub kind: EntryKind,
}

/// Filesystem statistics returned for `statfs`.
///
/// Block-related sizes are in units of `block_size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FsStats {
    /// Filesystem block size (bytes).
    pub block_size: u32,
    /// Total number of data blocks.
    pub total_blocks: u64,
    /// Number of free blocks.
    pub free_blocks: u64,
    /// Number of blocks available to unprivileged users.
    pub available_blocks: u64,
    /// Total number of file nodes (inodes).
    pub total_inodes: u64,
    /// Number of free file nodes.
    pub free_inodes: u64,
    /// Maximum filename length (bytes).
    pub max_filename_length: u32,
}
