//! File system utilities for the release pipeline.
//!
//! Provides atomic writes, idempotent directory helpers and bounded retry of
//! operations that can hit transient contention (a file briefly held open by
//! a scanner or another process).

use crate::bundler::error::{Error, ErrorExt, Result};
use std::{
    future::Future,
    io::{self, Write},
    path::Path,
    time::Duration,
};
use tokio::fs;

/// Raw OS error codes for sharing and lock violations on Windows.
#[cfg(windows)]
const ERROR_SHARING_VIOLATION: i32 = 32;
#[cfg(windows)]
const ERROR_LOCK_VIOLATION: i32 = 33;

/// Bounded retry of transient filesystem failures.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Fixed pause between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }
}

/// Whether an IO error is worth retrying.
///
/// Permission errors are permanent: on Windows a file held open by another
/// process reports a sharing violation instead.
pub fn is_transient(error: &io::Error) -> bool {
    use io::ErrorKind::*;
    matches!(error.kind(), ResourceBusy | WouldBlock | Interrupted) || is_sharing_violation(error)
}

#[cfg(windows)]
fn is_sharing_violation(error: &io::Error) -> bool {
    matches!(
        error.raw_os_error(),
        Some(ERROR_SHARING_VIOLATION | ERROR_LOCK_VIOLATION)
    )
}

#[cfg(not(windows))]
fn is_sharing_violation(_error: &io::Error) -> bool {
    false
}

/// Runs `op` until it succeeds, fails permanently, or the policy is exhausted.
///
/// # Arguments
///
/// * `policy` - attempt count and delay
/// * `context` - operation description for the error
/// * `path` - path the operation targets
/// * `op` - the operation
///
/// # Returns
///
/// The operation's value, [`Error::TransientIo`] when every attempt hit
/// contention, or [`Error::Fs`] on the first non-transient failure.
pub fn retry_io<T, F>(policy: RetryPolicy, context: &'static str, path: &Path, mut op: F) -> Result<T>
where
    F: FnMut() -> io::Result<T>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) && attempt < attempts => {
                log::debug!(
                    "{context} {} hit {e}, retrying ({attempt}/{attempts})",
                    path.display()
                );
                std::thread::sleep(policy.delay);
                attempt += 1;
            }
            Err(e) if is_transient(&e) => {
                return Err(Error::TransientIo {
                    context: context.to_string(),
                    path: path.to_path_buf(),
                    attempts,
                    source: e,
                });
            }
            Err(e) => return Err(e).fs_context(context, path),
        }
    }
}

/// Async counterpart of [`retry_io`] that sleeps on the runtime timer.
pub async fn retry_async<T, F, Fut>(
    policy: RetryPolicy,
    context: &'static str,
    path: &Path,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_transient(&e) && attempt < attempts => {
                log::debug!(
                    "{context} {} hit {e}, retrying ({attempt}/{attempts})",
                    path.display()
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(e) if is_transient(&e) => {
                return Err(Error::TransientIo {
                    context: context.to_string(),
                    path: path.to_path_buf(),
                    attempts,
                    source: e,
                });
            }
            Err(e) => return Err(e).fs_context(context, path),
        }
    }
}

/// Writes `bytes` to `path` so readers see either the old or the new content.
///
/// The data goes to a temporary file in the same directory, is flushed to
/// disk, then renamed over the destination.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).fs_context("creating directory", parent)?;

    let mut temp = tempfile::NamedTempFile::new_in(parent).fs_context("creating temp file", parent)?;
    temp.write_all(bytes).fs_context("writing temp file", temp.path())?;
    temp.as_file()
        .sync_all()
        .fs_context("flushing temp file", temp.path())?;
    temp.persist(path)
        .map_err(|e| e.error)
        .fs_context("replacing file", path)?;
    Ok(())
}

/// Copies a regular file, creating the destination's parent directories.
///
/// Fails if the source doesn't exist or is not a file.
pub async fn copy_file(from: &Path, to: &Path, policy: RetryPolicy) -> Result<()> {
    if !from.is_file() {
        return Err(Error::GenericError(format!(
            "{} does not exist or is not a file",
            from.display()
        )));
    }
    if let Some(dest_dir) = to.parent() {
        fs::create_dir_all(dest_dir)
            .await
            .fs_context("creating directory", dest_dir)?;
    }
    retry_async(policy, "copying file to", to, || fs::copy(from, to)).await?;
    Ok(())
}

/// Removes a file, treating a missing file as success.
pub async fn remove_file(path: &Path, policy: RetryPolicy) -> Result<()> {
    retry_async(policy, "removing file", path, || async {
        match fs::remove_file(path).await {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn quick(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            delay: Duration::from_millis(1),
        }
    }

    #[test]
    fn retries_until_success() {
        let calls = Cell::new(0);
        let value = retry_io(quick(4), "opening", Path::new("x"), || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(io::Error::from(io::ErrorKind::ResourceBusy))
            } else {
                Ok(7)
            }
        })
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn exhausted_retries_become_transient_error() {
        let calls = Cell::new(0);
        let err = retry_io::<(), _>(quick(3), "opening", Path::new("locked.nupkg"), || {
            calls.set(calls.get() + 1);
            Err(io::Error::from(io::ErrorKind::ResourceBusy))
        })
        .unwrap_err();
        assert_eq!(calls.get(), 3);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("locked.nupkg"));
    }

    #[test]
    fn permission_denied_fails_on_first_attempt() {
        let calls = Cell::new(0);
        let err = retry_io::<(), _>(quick(4), "replacing", Path::new("RELEASES"), || {
            calls.set(calls.get() + 1);
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        })
        .unwrap_err();
        assert_eq!(calls.get(), 1);
        assert!(!err.is_retryable());
        assert!(matches!(err, Error::Fs { .. }));
    }

    #[cfg(windows)]
    #[test]
    fn sharing_violations_are_transient() {
        assert!(is_transient(&io::Error::from_raw_os_error(ERROR_SHARING_VIOLATION)));
        assert!(is_transient(&io::Error::from_raw_os_error(ERROR_LOCK_VIOLATION)));
    }

    #[test]
    fn permanent_errors_are_not_retried() {
        let calls = Cell::new(0);
        let err = retry_io::<(), _>(quick(4), "opening", Path::new("gone"), || {
            calls.set(calls.get() + 1);
            Err(io::Error::from(io::ErrorKind::NotFound))
        })
        .unwrap_err();
        assert_eq!(calls.get(), 1);
        assert!(matches!(err, Error::Fs { .. }));
    }

    #[test]
    fn write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("RELEASES");
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let leftovers = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn copy_and_remove_file() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("a.txt");
        let to = dir.path().join("deep").join("b.txt");
        std::fs::write(&from, "hi").unwrap();
        copy_file(&from, &to, RetryPolicy::none()).await.unwrap();
        assert_eq!(std::fs::read_to_string(&to).unwrap(), "hi");
        remove_file(&to, RetryPolicy::none()).await.unwrap();
        remove_file(&to, RetryPolicy::none()).await.unwrap();
        assert!(!to.exists());
        assert!(copy_file(&dir.path().join("missing"), &to, RetryPolicy::none())
            .await
            .is_err());
    }
}
