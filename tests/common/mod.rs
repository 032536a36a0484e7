#![allow(dead_code, missing_docs, clippy::unwrap_used)]

use std::path::PathBuf;

use exposefs::backing::{BackingSet, BackingSource};
use exposefs::fs::ExposeFs;
use tempfile::TempDir;

/// Backing files on disk plus the filesystem serving them.
///
/// `dir` must outlive `fs` only for tests that touch the files again; the open handles keep the
/// data reachable regardless.
pub struct Fixture {
    pub dir: TempDir,
    pub fs: ExposeFs,
}

impl Fixture {
    /// Path of the backing file called `name`.
    pub fn backing_path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}

/// Write each `(name, content)` to a temporary directory and serve them in order, exposed under
/// their file names.
pub fn fixture(files: &[(&str, &[u8])]) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let sources: Vec<BackingSource> = files
        .iter()
        .map(|(name, content)| {
            let path = dir.path().join(name);
            std::fs::write(&path, content).unwrap();
            BackingSource::new(path)
        })
        .collect();

    let set = BackingSet::open(sources, "").unwrap();
    Fixture {
        dir,
        fs: ExposeFs::new(set),
    }
}

/// The single-file scenario: `hello` containing `hello, world\n`.
pub fn hello() -> Fixture {
    fixture(&[("hello", b"hello, world\n")])
}

/// `len` bytes of a pattern that never repeats within 251 bytes.
pub fn patterned(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}
