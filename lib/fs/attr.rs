//! Synthetic metadata. Nothing here is stored: every call recomputes from the [`BackingSet`].

use super::{
    BLOCK_SIZE, EntryKind, FsError, InodePerms, ROOT_INODE, ResolvedTarget, SyntheticAttributes,
};
use crate::backing::BackingSet;

/// Owner reported for every node.
const OWNER_UID: u32 = 0;
/// Group reported for every node.
const OWNER_GID: u32 = 0;

/// Produces [`SyntheticAttributes`] for resolved targets.
#[derive(Debug, Clone, Copy)]
pub struct AttributeProvider<'a> {
    set: &'a BackingSet,
}

impl<'a> AttributeProvider<'a> {
    /// A provider over `set`.
    #[must_use]
    pub fn new(set: &'a BackingSet) -> Self {
        Self { set }
    }

    /// Attributes of the root directory: `r-xr-xr-x`, one block in size, two links.
    #[must_use]
    pub fn root(&self) -> SyntheticAttributes {
        SyntheticAttributes {
            ino: ROOT_INODE,
            kind: EntryKind::Directory,
            perm: InodePerms::ALL_READ | InodePerms::ALL_EXECUTE,
            size: u64::from(BLOCK_SIZE),
            nlink: 2,
            uid: OWNER_UID,
            gid: OWNER_GID,
            time: self.set.created_at(),
        }
    }

    /// Attributes of a backing entry: `r--r--r--`, one link, sized by a fresh probe.
    pub fn entry(&self, index: usize) -> Result<SyntheticAttributes, FsError> {
        let entry = self.set.get(index).ok_or(FsError::NotFound)?;
        let ino = ResolvedTarget::Entry(index)
            .inode()
            .ok_or(FsError::NotFound)?;

        Ok(SyntheticAttributes {
            ino,
            kind: EntryKind::RegularFile,
            perm: InodePerms::ALL_READ,
            size: entry.current_size(),
            nlink: 1,
            uid: OWNER_UID,
            gid: OWNER_GID,
            time: self.set.created_at(),
        })
    }

    /// Attributes for any resolved target.
    pub fn attributes_for(&self, target: ResolvedTarget) -> Result<SyntheticAttributes, FsError> {
        match target {
            ResolvedTarget::Root => Ok(self.root()),
            ResolvedTarget::Entry(index) => self.entry(index),
            ResolvedTarget::NotFound => Err(FsError::NotFound),
        }
    }
}
