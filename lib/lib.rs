//! exposefs shared library.

/// The backing files and block devices served by the filesystem.
pub mod backing;
/// The synthetic directory, its request dispatch, and the FUSE binding.
pub mod fs;
