//! FUSE adapter: maps [`fuser::Filesystem`] callbacks to [`ExposeFs::dispatch`].
//!
//! Each callback becomes a [`Request`] and runs on the tokio blocking pool, so reads against slow
//! media occupy a worker thread rather than the FUSE session loop.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, error, instrument};

use super::{
    BLOCK_SIZE, EntryKind, ExposeFs, FsError, MutationKind, Request, Response,
    SyntheticAttributes,
};

/// Trait abstracting the `.error(errno)` method common to all fuser reply types.
trait FuseReply {
    fn error(self, errno: i32);
}

macro_rules! impl_fuse_reply {
    ($($ty:ty),* $(,)?) => {
        $(impl FuseReply for $ty {
            fn error(self, errno: i32) {
                // Calls the inherent fuser method (not this trait method).
                self.error(errno);
            }
        })*
    };
}

impl_fuse_reply!(
    fuser::ReplyEntry,
    fuser::ReplyAttr,
    fuser::ReplyDirectory,
    fuser::ReplyOpen,
    fuser::ReplyData,
    fuser::ReplyEmpty,
    fuser::ReplyStatfs,
    fuser::ReplyWrite,
    fuser::ReplyCreate,
);

/// Extension trait on dispatch results for FUSE reply handling.
///
/// Centralizes the error-logging + errno-reply path so each FUSE callback
/// only has to express its success path.
trait FuseResultExt {
    fn fuse_reply<R: FuseReply>(self, reply: R, on_ok: impl FnOnce(Response, R));
}

impl FuseResultExt for Result<Response, FsError> {
    fn fuse_reply<R: FuseReply>(self, reply: R, on_ok: impl FnOnce(Response, R)) {
        match self {
            Ok(response) => on_ok(response, reply),
            Err(e) => {
                debug!(error = %e, "replying error");
                reply.error(e.into());
            }
        }
    }
}

/// A response of the wrong kind for the callback. Dispatch never produces one.
fn unexpected<R: FuseReply>(response: &Response, reply: R) {
    error!(?response, "dispatch answered with an unexpected response kind");
    reply.error(libc::EIO);
}

fn kind_to_fuser(kind: EntryKind) -> fuser::FileType {
    match kind {
        EntryKind::Directory => fuser::FileType::Directory,
        EntryKind::RegularFile => fuser::FileType::RegularFile,
    }
}

/// Convert synthetic attributes to the fuser-specific `FileAttr`.
fn attr_to_fuser(attr: &SyntheticAttributes) -> fuser::FileAttr {
    fuser::FileAttr {
        ino: attr.ino,
        size: attr.size,
        blocks: attr.blocks(),
        atime: attr.time,
        mtime: attr.time,
        ctime: attr.time,
        crtime: attr.time,
        kind: kind_to_fuser(attr.kind),
        perm: attr.perm.bits(),
        nlink: attr.nlink,
        uid: attr.uid,
        gid: attr.gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

/// Bridges [`ExposeFs`] to the [`fuser::Filesystem`] trait.
pub struct FuserAdapter {
    fs: Arc<ExposeFs>,
    runtime: tokio::runtime::Handle,
}

impl FuserAdapter {
    // Sizes of removable media can change under us at any moment, so keep kernel caching short.
    const ATTR_TTL: Duration = Duration::from_secs(1);

    /// Serve `fs`, running requests on `runtime`'s blocking pool.
    pub fn new(fs: Arc<ExposeFs>, runtime: tokio::runtime::Handle) -> Self {
        Self { fs, runtime }
    }

    /// Dispatch `request` off the session thread and reply once it is answered.
    fn serve<R, F>(&self, request: Request, reply: R, on_ok: F)
    where
        R: FuseReply + Send + 'static,
        F: FnOnce(Response, R) + Send + 'static,
    {
        let fs = Arc::clone(&self.fs);
        self.runtime.spawn_blocking(move || {
            fs.dispatch(request).fuse_reply(reply, on_ok);
        });
    }

    fn reply_attr(&self, request: Request, reply: fuser::ReplyAttr) {
        self.serve(request, reply, |response, reply| match response {
            Response::Attributes(attr) => {
                let f_attr = attr_to_fuser(&attr);
                debug!(?f_attr, "replying...");
                reply.attr(&Self::ATTR_TTL, &f_attr);
            }
            other => unexpected(&other, reply),
        });
    }

    fn reply_opened(&self, request: Request, reply: fuser::ReplyOpen) {
        self.serve(request, reply, |response, reply| match response {
            Response::Opened(fh) => {
                debug!(handle = fh, "replying...");
                reply.opened(fh, 0);
            }
            other => unexpected(&other, reply),
        });
    }

    fn reply_released(&self, request: Request, reply: fuser::ReplyEmpty) {
        self.serve(request, reply, |response, reply| match response {
            Response::Released => reply.ok(),
            other => unexpected(&other, reply),
        });
    }

    /// Mutations never succeed; the dispatch default branch picks the errno.
    fn reject<R>(&self, kind: MutationKind, reply: R)
    where
        R: FuseReply + Send + 'static,
    {
        self.serve(Request::Mutate(kind), reply, |response, reply| {
            unexpected(&response, reply);
        });
    }
}

impl fuser::Filesystem for FuserAdapter {
    #[instrument(name = "FuserAdapter::lookup", skip(self, _req, reply))]
    fn lookup(
        &mut self,
        _req: &fuser::Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: fuser::ReplyEntry,
    ) {
        let request = Request::Lookup {
            parent,
            name: name.to_owned(),
        };
        self.serve(request, reply, |response, reply| match response {
            Response::Attributes(attr) => {
                let f_attr = attr_to_fuser(&attr);
                debug!(?f_attr, "replying...");
                reply.entry(&Self::ATTR_TTL, &f_attr, 0);
            }
            other => unexpected(&other, reply),
        });
    }

    #[instrument(name = "FuserAdapter::getattr", skip(self, _req, _fh, reply))]
    fn getattr(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: Option<u64>,
        reply: fuser::ReplyAttr,
    ) {
        self.reply_attr(Request::GetAttributes { at: ino.into() }, reply);
    }

    #[instrument(
        name = "FuserAdapter::setattr",
        skip(
            self, _req, _ino, _atime, _mtime, _ctime, _fh, _crtime, _chgtime, _bkuptime, _flags,
            reply
        )
    )]
    fn setattr(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<fuser::TimeOrNow>,
        _mtime: Option<fuser::TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: fuser::ReplyAttr,
    ) {
        let kind = if uid.is_some() || gid.is_some() {
            MutationKind::Chown
        } else if mode.is_some() {
            MutationKind::Chmod
        } else if size.is_some() {
            MutationKind::Truncate
        } else {
            MutationKind::SetTimes
        };
        self.reject(kind, reply);
    }

    #[instrument(name = "FuserAdapter::open", skip(self, _req, reply))]
    fn open(&mut self, _req: &fuser::Request<'_>, ino: u64, flags: i32, reply: fuser::ReplyOpen) {
        let request = Request::Open {
            at: ino.into(),
            flags: flags.into(),
        };
        self.reply_opened(request, reply);
    }

    #[instrument(
        name = "FuserAdapter::read",
        skip(self, _req, _fh, _flags, _lock_owner, reply)
    )]
    fn read(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyData,
    ) {
        let request = Request::Read {
            at: ino.into(),
            offset,
            size,
        };
        self.serve(request, reply, |response, reply| match response {
            Response::Data(data) => {
                debug!(read_bytes = data.len(), "replying...");
                reply.data(&data);
            }
            other => unexpected(&other, reply),
        });
    }

    #[instrument(name = "FuserAdapter::release", skip(self, _req, _flags, _lock_owner, reply))]
    fn release(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: fuser::ReplyEmpty,
    ) {
        self.reply_released(Request::Release { fh }, reply);
    }

    #[instrument(name = "FuserAdapter::opendir", skip(self, _req, _flags, reply))]
    fn opendir(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _flags: i32,
        reply: fuser::ReplyOpen,
    ) {
        self.reply_opened(Request::OpenDirectory { at: ino.into() }, reply);
    }

    #[instrument(name = "FuserAdapter::readdir", skip(self, _req, _fh, reply))]
    fn readdir(
        &mut self,
        _req: &fuser::Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        reply: fuser::ReplyDirectory,
    ) {
        let request = Request::ReadDirectory {
            at: ino.into(),
            offset,
        };
        self.serve(request, reply, |response, mut reply| {
            let entries = match response {
                Response::Directory(entries) => entries,
                other => {
                    unexpected(&other, reply);
                    return;
                }
            };

            for (next, entry) in &entries {
                let Ok(next) = i64::try_from(*next) else {
                    error!("Directory offset {next} too large for fuser");
                    reply.error(libc::EIO);
                    return;
                };

                debug!(?entry, "adding entry to reply...");
                if reply.add(entry.ino, next, kind_to_fuser(entry.kind), &entry.name) {
                    debug!("buffer full for now, stopping readdir");
                    break;
                }
            }

            debug!("finalizing reply...");
            reply.ok();
        });
    }

    #[instrument(name = "FuserAdapter::releasedir", skip(self, _req, _flags, reply))]
    fn releasedir(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        reply: fuser::ReplyEmpty,
    ) {
        self.reply_released(Request::Release { fh }, reply);
    }

    #[instrument(name = "FuserAdapter::statfs", skip(self, _req, _ino, reply))]
    fn statfs(&mut self, _req: &fuser::Request<'_>, _ino: u64, reply: fuser::ReplyStatfs) {
        self.serve(Request::StatFs, reply, |response, reply| match response {
            Response::Stats(stats) => {
                debug!(?stats, "replying...");
                reply.statfs(
                    stats.total_blocks,
                    stats.free_blocks,
                    stats.available_blocks,
                    stats.total_inodes,
                    stats.free_inodes,
                    stats.block_size,
                    stats.max_filename_length,
                    stats.block_size,
                );
            }
            other => unexpected(&other, reply),
        });
    }

    #[instrument(name = "FuserAdapter::write", skip_all)]
    fn write(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        _fh: u64,
        _offset: i64,
        _data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: fuser::ReplyWrite,
    ) {
        self.reject(MutationKind::Write, reply);
    }

    #[instrument(name = "FuserAdapter::create", skip_all)]
    fn create(
        &mut self,
        _req: &fuser::Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: fuser::ReplyCreate,
    ) {
        self.reject(MutationKind::Create, reply);
    }

    #[instrument(name = "FuserAdapter::mknod", skip_all)]
    fn mknod(
        &mut self,
        _req: &fuser::Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: fuser::ReplyEntry,
    ) {
        self.reject(MutationKind::Mknod, reply);
    }

    #[instrument(name = "FuserAdapter::mkdir", skip_all)]
    fn mkdir(
        &mut self,
        _req: &fuser::Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: fuser::ReplyEntry,
    ) {
        self.reject(MutationKind::Mkdir, reply);
    }

    #[instrument(name = "FuserAdapter::unlink", skip_all)]
    fn unlink(
        &mut self,
        _req: &fuser::Request<'_>,
        _parent: u64,
        _name: &OsStr,
        reply: fuser::ReplyEmpty,
    ) {
        self.reject(MutationKind::Unlink, reply);
    }

    #[instrument(name = "FuserAdapter::rmdir", skip_all)]
    fn rmdir(
        &mut self,
        _req: &fuser::Request<'_>,
        _parent: u64,
        _name: &OsStr,
        reply: fuser::ReplyEmpty,
    ) {
        self.reject(MutationKind::Rmdir, reply);
    }

    #[instrument(name = "FuserAdapter::symlink", skip_all)]
    fn symlink(
        &mut self,
        _req: &fuser::Request<'_>,
        _parent: u64,
        _link_name: &OsStr,
        _target: &Path,
        reply: fuser::ReplyEntry,
    ) {
        self.reject(MutationKind::Symlink, reply);
    }

    #[instrument(name = "FuserAdapter::rename", skip_all)]
    fn rename(
        &mut self,
        _req: &fuser::Request<'_>,
        _parent: u64,
        _name: &OsStr,
        _newparent: u64,
        _newname: &OsStr,
        _flags: u32,
        reply: fuser::ReplyEmpty,
    ) {
        self.reject(MutationKind::Rename, reply);
    }

    #[instrument(name = "FuserAdapter::link", skip_all)]
    fn link(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        _newparent: u64,
        _newname: &OsStr,
        reply: fuser::ReplyEntry,
    ) {
        self.reject(MutationKind::Link, reply);
    }

    #[instrument(name = "FuserAdapter::setxattr", skip_all)]
    fn setxattr(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        _name: &OsStr,
        _value: &[u8],
        _flags: i32,
        _position: u32,
        reply: fuser::ReplyEmpty,
    ) {
        self.reject(MutationKind::SetXattr, reply);
    }

    #[instrument(name = "FuserAdapter::removexattr", skip_all)]
    fn removexattr(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        _name: &OsStr,
        reply: fuser::ReplyEmpty,
    ) {
        self.reject(MutationKind::RemoveXattr, reply);
    }

    #[instrument(name = "FuserAdapter::fallocate", skip_all)]
    fn fallocate(
        &mut self,
        _req: &fuser::Request<'_>,
        _ino: u64,
        _fh: u64,
        _offset: i64,
        _length: i64,
        _mode: i32,
        reply: fuser::ReplyEmpty,
    ) {
        self.reject(MutationKind::Fallocate, reply);
    }
}
