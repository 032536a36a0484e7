//! Request failures and their errno mapping.

use thiserror::Error;

use super::MutationKind;

/// Every way a request can fail. Resolved into an errno at the adapter boundary.
#[derive(Debug, Error)]
pub enum FsError {
    /// The target does not exist.
    #[error("no such entry")]
    NotFound,

    /// A file operation was aimed at the root.
    #[error("is a directory")]
    IsADirectory,

    /// A directory operation was aimed at an entry.
    #[error("not a directory")]
    NotADirectory,

    /// The protocol delivered a negative offset.
    #[error("invalid offset {0}")]
    InvalidOffset(i64),

    /// Mutations are never applied.
    #[error("{0} is not supported on a read-only filesystem")]
    Unsupported(MutationKind),

    /// The backing resource failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert an I/O error to the corresponding errno value for FUSE replies.
#[expect(
    clippy::wildcard_enum_match_arm,
    reason = "ErrorKind is non_exhaustive; EIO is the safe default"
)]
fn io_to_errno(e: &std::io::Error) -> i32 {
    e.raw_os_error().unwrap_or_else(|| match e.kind() {
        std::io::ErrorKind::NotFound => libc::ENOENT,
        std::io::ErrorKind::PermissionDenied => libc::EACCES,
        std::io::ErrorKind::InvalidInput => libc::EINVAL,
        _ => libc::EIO,
    })
}

impl From<FsError> for i32 {
    fn from(e: FsError) -> Self {
        match e {
            FsError::NotFound => libc::ENOENT,
            FsError::IsADirectory => libc::EISDIR,
            FsError::NotADirectory => libc::ENOTDIR,
            FsError::InvalidOffset(_) => libc::EINVAL,
            FsError::Unsupported(_) => libc::ENOSYS,
            FsError::Io(ref io_err) => io_to_errno(io_err),
        }
    }
}
