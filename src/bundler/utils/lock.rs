//! Advisory locking of a release directory.
//!
//! Merging and persisting `RELEASES` is not transactional across processes,
//! so a run holds an exclusive lock on `<release_dir>/.releasify.lock`.

use crate::bundler::{Error, Result, error::ErrorExt};
use std::{fs::OpenOptions, path::Path};

/// Lock file created inside the release directory.
pub const LOCK_FILE_NAME: &str = ".releasify.lock";

/// Held for the duration of a run; released on drop.
#[derive(Debug)]
pub struct DirLock {
    #[cfg(unix)]
    _lock: nix::fcntl::Flock<std::fs::File>,
    #[cfg(not(unix))]
    _file: std::fs::File,
}

impl DirLock {
    /// Takes the lock without blocking.
    ///
    /// Fails with a validation error when another run holds it.
    pub fn acquire(release_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(release_dir).fs_context("creating release directory", release_dir)?;
        let path = release_dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .fs_context("opening lock file", &path)?;

        #[cfg(unix)]
        {
            use nix::fcntl::{Flock, FlockArg};
            match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
                Ok(lock) => {
                    log::debug!("Locked {}", path.display());
                    Ok(Self { _lock: lock })
                }
                Err((_, nix::errno::Errno::EWOULDBLOCK)) => Err(Error::validation(format!(
                    "{} is locked by another release run",
                    release_dir.display()
                ))),
                Err((_, errno)) => Err(std::io::Error::from(errno)).fs_context("locking", &path),
            }
        }

        #[cfg(not(unix))]
        {
            log::debug!("Advisory locking unavailable; proceeding without {}", path.display());
            Ok(Self { _file: file })
        }
    }
}
