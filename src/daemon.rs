use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use exposefs::backing::{BackingSet, BackingSetError};
use exposefs::fs::ExposeFs;
use thiserror::Error;
use tokio::select;
use tokio::signal::unix::{SignalKind, signal};

use crate::app_config;
use tracing::{debug, error, info};

mod managed_fuse {
    //! Lifecycle of the mounted session. Dropping the fuser session only does a regular
    //! unmount, which a lingering reader can block; [`UnmountGuard`] follows up with a forced,
    //! lazy one.
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use nix::errno::Errno;

    use super::{ExposeFs, app_config, debug, error};
    use exposefs::fs::fuser::FuserAdapter;
    use fuser::BackgroundSession;

    /// The live session. Dropping it performs the regular unmount.
    pub struct FuseSession {
        _session: BackgroundSession,
    }

    /// Mount `fs` read-only at the configured mount point.
    pub fn mount(
        config: &app_config::Config,
        fs: Arc<ExposeFs>,
        handle: tokio::runtime::Handle,
    ) -> Result<FuseSession, std::io::Error> {
        let adapter = FuserAdapter::new(fs, handle);
        let mut options = vec![
            fuser::MountOption::FSName(config.fs_name.clone()),
            fuser::MountOption::RO,
            fuser::MountOption::NoDev,
            fuser::MountOption::NoSuid,
            fuser::MountOption::DefaultPermissions,
        ];
        if config.allow_other {
            options.push(fuser::MountOption::AllowOther);
            options.push(fuser::MountOption::AutoUnmount);
        }

        Ok(FuseSession {
            _session: fuser::spawn_mount2(adapter, &config.mount_point, &options)?,
        })
    }

    /// Forces the mount away once the session is gone.
    pub struct UnmountGuard {
        mount_point: PathBuf,
    }

    impl UnmountGuard {
        pub fn new(config: &app_config::Config) -> Self {
            Self {
                mount_point: config.mount_point.clone(),
            }
        }

        fn force_unmount(&self) -> nix::Result<()> {
            #[cfg(target_os = "macos")]
            {
                nix::mount::unmount(&self.mount_point, nix::mount::MntFlags::MNT_FORCE)
            }

            #[cfg(target_os = "linux")]
            {
                nix::mount::umount2(&self.mount_point, nix::mount::MntFlags::MNT_DETACH)
            }
        }
    }

    impl Drop for UnmountGuard {
        fn drop(&mut self) {
            const ATTEMPTS: u32 = 10;
            const BACKOFF: Duration = Duration::from_millis(10);

            debug!(mount_point = %self.mount_point.display(), "forcing unmount");

            for attempt in 1..=ATTEMPTS {
                match self.force_unmount() {
                    Ok(()) => {
                        debug!(attempt, "mount point released");
                        return;
                    }
                    // A reader still holds the mount open.
                    Err(Errno::EBUSY) => std::thread::sleep(BACKOFF),
                    Err(Errno::EINVAL | Errno::ENOENT) => {
                        debug!(attempt, "mount point already released");
                        return;
                    }
                    Err(e) => {
                        error!(attempt, error = %e, "forced unmount failed");
                        return;
                    }
                }
            }
            error!(mount_point = %self.mount_point.display(), "mount point still busy, giving up");
        }
    }
}

/// Why the daemon stopped early.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Mount point, mount or signal setup failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A backing resource could not be opened.
    #[error("{0}")]
    Backing(#[from] BackingSetError),
}

/// Make sure `mount_point` is an empty directory, creating it if missing.
async fn prepare_mount_point(mount_point: &Path) -> Result<(), std::io::Error> {
    let mut listing = match tokio::fs::read_dir(mount_point).await {
        Ok(listing) => listing,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tokio::fs::create_dir_all(mount_point).await?;
            info!(path = %mount_point.display(), "Created mount point directory.");
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    if listing.next_entry().await?.is_some() {
        return Err(std::io::Error::new(
            ErrorKind::DirectoryNotEmpty,
            format!("mount point '{}' is not empty", mount_point.display()),
        ));
    }
    Ok(())
}

/// Resolve on SIGINT, SIGTERM or SIGHUP.
async fn wait_for_exit() -> Result<(), std::io::Error> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;
    let received = select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = hangup.recv() => "SIGHUP",
    };
    debug!(signal = received, "shutting down");
    Ok(())
}

/// Main entry point for the daemon.
///
/// Backing resources are opened before the mount becomes visible and closed only after the
/// session and its unmount guard are gone.
pub async fn run(
    config: app_config::Config,
    handle: tokio::runtime::Handle,
) -> Result<(), DaemonError> {
    prepare_mount_point(&config.mount_point).await?;

    let set = BackingSet::open(config.backing_sources(), &config.name_suffix)?;
    if set.is_empty() {
        info!("No backing resources configured; the mount will be empty.");
    }
    let fs = Arc::new(ExposeFs::new(set));

    info!("Mounting filesystem at {}.", config.mount_point.display());

    let guard = managed_fuse::UnmountGuard::new(&config);
    {
        let _session = managed_fuse::mount(&config, Arc::clone(&fs), handle)?;
        info!("exposefs is running. Press Ctrl+C to stop.");

        wait_for_exit().await?;
    }
    drop(guard);
    drop(fs);
    info!("Unmounted {}.", config.mount_point.display());
    Ok(())
}

pub fn spawn(config: app_config::Config) -> Result<(), DaemonError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(config, runtime.handle().clone()))
}
