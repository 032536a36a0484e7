//! Name resolution over the flat namespace.
//!
//! Resolution is a pure function of the [`BackingSet`]: it has no side effects and does not
//! depend on which entries are open.

use std::ffi::OsStr;
use std::path::{Component, Path};

use super::{InodeAddr, ROOT_INODE, ResolvedTarget};
use crate::backing::BackingSet;

/// Maps paths, inodes and `(parent, name)` pairs onto [`ResolvedTarget`]s.
#[derive(Debug, Clone, Copy)]
pub struct NameResolver<'a> {
    set: &'a BackingSet,
}

impl<'a> NameResolver<'a> {
    /// A resolver over `set`.
    #[must_use]
    pub fn new(set: &'a BackingSet) -> Self {
        Self { set }
    }

    /// Resolve an absolute path.
    ///
    /// `/` is the root. Otherwise the path must consist of exactly one name below the root,
    /// compared byte-for-byte against entry names in listing order.
    #[must_use]
    pub fn resolve(&self, path: &Path) -> ResolvedTarget {
        let mut name = None;
        for component in path.components() {
            match component {
                Component::RootDir | Component::CurDir => {}
                Component::Normal(n) if name.is_none() => name = Some(n),
                // Nested names, `..` and prefixes never exist in a depth-one tree.
                Component::Normal(_) | Component::ParentDir | Component::Prefix(_) => {
                    return ResolvedTarget::NotFound;
                }
            }
        }

        match name {
            Some(n) => self.resolve_name(n),
            None if path.has_root() => ResolvedTarget::Root,
            None => ResolvedTarget::NotFound,
        }
    }

    /// Resolve a single entry name within the root directory.
    #[must_use]
    pub fn resolve_name(&self, name: &OsStr) -> ResolvedTarget {
        self.set
            .position(name)
            .map_or(ResolvedTarget::NotFound, ResolvedTarget::Entry)
    }

    /// Resolve a FUSE inode number.
    #[must_use]
    pub fn resolve_inode(&self, ino: InodeAddr) -> ResolvedTarget {
        if ino == ROOT_INODE {
            return ResolvedTarget::Root;
        }

        ino.checked_sub(2)
            .and_then(|index| usize::try_from(index).ok())
            .filter(|&index| index < self.set.len())
            .map_or(ResolvedTarget::NotFound, ResolvedTarget::Entry)
    }
}
