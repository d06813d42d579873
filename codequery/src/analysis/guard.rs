//! Write protection of the analyzed repository.
//!
//! The analysis tool is untrusted; while it runs, write permission is
//! stripped from every file under the repository and restored afterwards.
//! This is a best-effort guard, not a security boundary: it does not stop a
//! process running as the owner from chmod-ing things back.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use walkdir::WalkDir;

/// Toggles write permission on a directory tree.
pub trait WriteProtector: Send + Sync {
    /// Remove write permission recursively.
    fn protect(&self, path: &Path) -> Result<()>;

    /// Give write permission back recursively.
    fn restore(&self, path: &Path) -> Result<()>;
}

/// Protector using file mode bits: `a-w` on protect, `u+w` on restore.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChmodProtector;

impl WriteProtector for ChmodProtector {
    fn protect(&self, path: &Path) -> Result<()> {
        apply_recursive(path, false)
    }

    fn restore(&self, path: &Path) -> Result<()> {
        apply_recursive(path, true)
    }
}

fn apply_recursive(root: &Path, writable: bool) -> Result<()> {
    let mut failures = 0usize;

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                failures += 1;
                tracing::debug!("Skipping unreadable entry under {}: {e}", root.display());
                continue;
            }
        };

        // chmod on a symlink would change its target, which may live outside root
        if entry.path_is_symlink() {
            continue;
        }

        if let Err(e) = set_writable(entry.path(), writable) {
            failures += 1;
            tracing::debug!("Failed to chmod {}: {e:#}", entry.path().display());
        }
    }

    if failures > 0 {
        anyhow::bail!(
            "{failures} entries under {} could not be updated",
            root.display()
        );
    }
    Ok(())
}

#[cfg(unix)]
fn set_writable(path: &Path, writable: bool) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    let mode = metadata.permissions().mode();
    let new_mode = if writable { mode | 0o200 } else { mode & !0o222 };
    if new_mode != mode {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(new_mode))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_writable(path: &Path, writable: bool) -> Result<()> {
    let mut permissions = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .permissions();
    permissions.set_readonly(!writable);
    std::fs::set_permissions(path, permissions)
        .with_context(|| format!("Failed to set permissions on {}", path.display()))
}

/// Held for the lifetime of an invocation; undoes the protection when released.
///
/// Both chmod passes run on the blocking pool. [`WriteGuard::release`] is
/// the normal exit; if the guard is dropped without it (panic, or the
/// invoking future being cancelled) `Drop` restores synchronously instead.
pub struct WriteGuard {
    protector: Arc<dyn WriteProtector>,
    path: PathBuf,
    /// Held by whichever pass is running, so a fallback restore can't
    /// interleave with a protect still in flight.
    pass: Arc<Mutex<()>>,
    released: bool,
}

impl WriteGuard {
    /// Protect `path` and return the guard that undoes it.
    ///
    /// A failed protect is logged and the guard is still returned, so the
    /// restore always runs for whatever was changed.
    pub async fn acquire(protector: Arc<dyn WriteProtector>, path: &Path) -> Self {
        let guard = Self {
            protector,
            path: path.to_path_buf(),
            pass: Arc::new(Mutex::new(())),
            released: false,
        };

        let outcome = guard.run_pass(false).await;
        match outcome {
            Ok(()) => tracing::debug!("Write protection enabled for {}", guard.path.display()),
            Err(e) => tracing::warn!(
                "Write protection incomplete for {}: {e:#}",
                guard.path.display()
            ),
        }
        guard
    }

    /// Restore write permission.
    pub async fn release(mut self) {
        self.released = true;
        match self.run_pass(true).await {
            Ok(()) => tracing::debug!("Write permission restored for {}", self.path.display()),
            Err(e) => tracing::error!(
                "Failed to restore write permission for {}: {e:#}",
                self.path.display()
            ),
        }
    }

    fn run_pass(&self, writable: bool) -> impl std::future::Future<Output = Result<()>> {
        let protector = self.protector.clone();
        let path = self.path.clone();
        let pass = self.pass.clone();
        // Spawned before the first poll, so the pass runs to completion even if
        // the caller stops waiting.
        let task = tokio::task::spawn_blocking(move || {
            let _pass = pass.lock();
            if writable {
                protector.restore(&path)
            } else {
                protector.protect(&path)
            }
        });
        async move { task.await.context("Permission task failed")? }
    }
}

impl Drop for WriteGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let _pass = self.pass.lock();
        match self.protector.restore(&self.path) {
            Ok(()) => tracing::debug!("Write permission restored for {}", self.path.display()),
            Err(e) => tracing::error!(
                "Failed to restore write permission for {}: {e:#}",
                self.path.display()
            ),
        }
    }
}

/// One async mutex per repository path.
///
/// Serializes invocations on the same path so one invocation's restore can't
/// re-enable writes while another's analysis is still running.
#[derive(Default)]
pub struct PathLocks {
    locks: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl PathLocks {
    pub async fn lock(&self, path: &Path) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            locks
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
