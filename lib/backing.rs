//! Backing resources: the files and block devices exposed inside the mount.
//!
//! A [`BackingSet`] is assembled once before mounting and never changes afterwards. Every entry
//! holds its resource open for the lifetime of the set; handles close when the set is dropped.

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{Seek as _, SeekFrom};
use std::os::unix::ffi::OsStrExt as _;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use thiserror::Error;
use tracing::{info, warn};

/// Where to find a backing resource and, optionally, what to call it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackingSource {
    /// Path of the file or block device.
    pub path: PathBuf,
    /// Name to expose it under. Derived from the path when absent.
    pub name: Option<OsString>,
}

impl BackingSource {
    /// A source exposed under its derived name.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            name: None,
        }
    }

    /// A source exposed under an explicit name.
    pub fn named(path: impl Into<PathBuf>, name: impl Into<OsString>) -> Self {
        Self {
            path: path.into(),
            name: Some(name.into()),
        }
    }

    /// The name this source is exposed under: the explicit name if any, else the last path
    /// component followed by `suffix`.
    fn display_name(&self, suffix: &str) -> Result<OsString, BackingSetError> {
        if let Some(name) = &self.name {
            return Ok(name.clone());
        }

        let mut name = self
            .path
            .file_name()
            .ok_or_else(|| BackingSetError::NoFileName(self.path.clone()))?
            .to_owned();
        name.push(suffix);
        Ok(name)
    }
}

/// Why a [`BackingSet`] could not be assembled.
#[derive(Debug, Error)]
pub enum BackingSetError {
    /// The resource could not be opened or measured.
    #[error("failed to open backing resource '{}': {source}", .path.display())]
    Open {
        /// The resource's path.
        path: PathBuf,
        /// The underlying failure.
        #[source]
        source: std::io::Error,
    },

    /// No name was given and the path has no last component.
    #[error("backing path '{}' has no final component to derive a name from", .0.display())]
    NoFileName(PathBuf),

    /// The name is empty, `.`, `..` or contains `/`.
    #[error("invalid entry name {0:?}")]
    InvalidName(OsString),

    /// Two sources share a name.
    #[error("duplicate entry name {0:?}")]
    DuplicateName(OsString),
}

/// Whether `name` can appear as a single entry of a flat directory.
pub fn is_valid_entry_name(name: &OsStr) -> bool {
    let bytes = name.as_bytes();
    !bytes.is_empty() && bytes != b"." && bytes != b".." && !bytes.contains(&b'/')
}

/// Current length of an open resource.
///
/// Regular files answer through `fstat`. Block devices report zero there, so anything that is
/// not a regular file is measured by seeking to its end. Reads are positioned, so moving the
/// shared cursor is harmless.
fn probe_size(file: &File) -> std::io::Result<u64> {
    let meta = file.metadata()?;
    if meta.file_type().is_file() {
        return Ok(meta.len());
    }

    let mut cursor = file;
    cursor.seek(SeekFrom::End(0))
}

/// A probed size, or 0 with a warning when the probe failed.
fn size_or_zero(probed: std::io::Result<u64>, name: &OsStr, path: &Path) -> u64 {
    probed.unwrap_or_else(|e| {
        warn!(name = ?name, path = %path.display(), error = %e,
            "size probe failed, reporting an empty entry");
        0
    })
}

/// One exposed resource.
#[derive(Debug)]
pub struct BackingEntry {
    name: OsString,
    path: PathBuf,
    file: File,
    mount_size: u64,
}

impl BackingEntry {
    /// The name of this entry inside the mount.
    #[must_use]
    pub fn name(&self) -> &OsStr {
        &self.name
    }

    /// Where the resource was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The shared, read-only handle. Only positioned reads may be issued against it.
    #[must_use]
    pub fn file(&self) -> &File {
        &self.file
    }

    /// The length recorded when the resource was opened.
    #[must_use]
    pub fn mount_size(&self) -> u64 {
        self.mount_size
    }

    /// Probe the resource's length now. Removable media may change between mount and query.
    pub fn probe_size(&self) -> std::io::Result<u64> {
        probe_size(&self.file)
    }

    /// The resource's current length, or 0 if the probe fails.
    #[must_use]
    pub fn current_size(&self) -> u64 {
        size_or_zero(self.probe_size(), &self.name, &self.path)
    }
}

/// The ordered, immutable collection of exposed resources.
///
/// Order is insertion order. It fixes both the directory listing order and each entry's index.
#[derive(Debug)]
pub struct BackingSet {
    entries: Vec<BackingEntry>,
    created_at: SystemTime,
}

impl BackingSet {
    /// A set with no entries. The mounted directory holds only `.` and `..`.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            created_at: SystemTime::now(),
        }
    }

    /// Open every source read-only, in order.
    ///
    /// Fails on the first resource that cannot be opened or whose name is invalid or taken.
    pub fn open<I>(sources: I, name_suffix: &str) -> Result<Self, BackingSetError>
    where
        I: IntoIterator<Item = BackingSource>,
    {
        let mut entries = Vec::new();
        let mut seen = HashSet::new();

        for source in sources {
            let name = source.display_name(name_suffix)?;
            if !is_valid_entry_name(&name) {
                return Err(BackingSetError::InvalidName(name));
            }
            if !seen.insert(name.clone()) {
                return Err(BackingSetError::DuplicateName(name));
            }

            let file = File::open(&source.path).map_err(|source_err| BackingSetError::Open {
                path: source.path.clone(),
                source: source_err,
            })?;
            let mount_size = probe_size(&file).map_err(|source_err| BackingSetError::Open {
                path: source.path.clone(),
                source: source_err,
            })?;

            info!(name = ?name, path = %source.path.display(), size = mount_size,
                "Opened backing resource.");
            entries.push(BackingEntry {
                name,
                path: source.path,
                file,
                mount_size,
            });
        }

        Ok(Self {
            entries,
            created_at: SystemTime::now(),
        })
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&BackingEntry> {
        self.entries.get(index)
    }

    /// Entries in listing order.
    pub fn iter(&self) -> std::slice::Iter<'_, BackingEntry> {
        self.entries.iter()
    }

    /// Index of the first entry called `name`.
    #[must_use]
    pub fn position(&self, name: &OsStr) -> Option<usize> {
        self.entries.iter().position(|entry| entry.name.as_os_str() == name)
    }

    /// When the set was assembled. Reported as every node's timestamp.
    #[must_use]
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }
}

impl<'a> IntoIterator for &'a BackingSet {
    type Item = &'a BackingEntry;
    type IntoIter = std::slice::Iter<'a, BackingEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_name_appends_suffix_to_last_component() {
        let source = BackingSource::new("/dev/sr0");
        assert_eq!(source.display_name(".iso").ok(), Some(OsString::from("sr0.iso")));
    }

    #[test]
    fn explicit_name_ignores_suffix() {
        let source = BackingSource::named("/dev/sr0", "disc");
        assert_eq!(source.display_name(".iso").ok(), Some(OsString::from("disc")));
    }

    #[test]
    fn root_path_has_no_derivable_name() {
        let source = BackingSource::new("/");
        assert!(matches!(
            source.display_name(""),
            Err(BackingSetError::NoFileName(_))
        ));
    }

    #[test]
    fn failed_size_probe_reports_zero() {
        let err = std::io::Error::from_raw_os_error(libc::ENOMEDIUM);
        assert_eq!(
            size_or_zero(Err(err), OsStr::new("sr0"), Path::new("/dev/sr0")),
            0
        );
    }

    #[test]
    fn successful_size_probe_passes_through() {
        assert_eq!(
            size_or_zero(Ok(2048), OsStr::new("sr0"), Path::new("/dev/sr0")),
            2048
        );
    }

    #[test]
    fn entry_name_validation() {
        assert!(is_valid_entry_name(OsStr::new("hello")));
        assert!(is_valid_entry_name(OsStr::new(".hidden")));
        assert!(!is_valid_entry_name(OsStr::new("")));
        assert!(!is_valid_entry_name(OsStr::new(".")));
        assert!(!is_valid_entry_name(OsStr::new("..")));
        assert!(!is_valid_entry_name(OsStr::new("a/b")));
    }
}
