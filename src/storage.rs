// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Local file writes that never expose partially written content, and per-tenant locks

use crate::constants::lock;
use crate::error::{Result, TenantError};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Write `contents` to `path` through a temp file in the same directory and an atomic rename.
///
/// The temp file is created owner-only (0600 on Unix) and keeps that mode after the rename.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)
        .map_err(|e| TenantError::storage(format!("cannot create {}: {}", dir.display(), e)))?;

    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| TenantError::storage(format!("cannot create temp file in {}: {}", dir.display(), e)))?;
    tmp.write_all(contents)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| TenantError::storage(format!("cannot write {}: {}", path.display(), e)))?;
    tmp.persist(path)
        .map_err(|e| TenantError::storage(format!("cannot replace {}: {}", path.display(), e.error)))?;
    Ok(())
}

/// Remove a file, treating a missing file as success. Returns whether something was removed.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(TenantError::storage(format!("cannot remove {}: {}", path.display(), e))),
    }
}

/// Remove a directory if it is empty; anything else is left alone
pub fn remove_dir_if_empty(path: &Path) {
    let _ = fs::remove_dir(path);
}

/// Exclusive lock held as a file created with `create_new`; removed again on drop.
///
/// A process killed while holding it leaves the file behind, and it has to be
/// deleted by hand.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Take the lock, polling with backoff while another holder has it
    pub async fn acquire(path: &Path, wait: Duration) -> Result<Self> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .map_err(|e| TenantError::storage(format!("cannot create {}: {}", dir.display(), e)))?;
        }

        let deadline = Instant::now() + wait;
        let mut delay = Duration::from_millis(lock::POLL_INITIAL_MILLIS);
        loop {
            match OpenOptions::new().write(true).create_new(true).open(path) {
                Ok(mut file) => {
                    let _ = writeln!(file, "{}", std::process::id());
                    debug!("Acquired lock {}", path.display());
                    return Ok(Self {
                        path: path.to_path_buf(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(TenantError::storage(format!(
                        "cannot create lock {}: {}",
                        path.display(),
                        e
                    )))
                }
            }

            if Instant::now() + delay > deadline {
                return Err(TenantError::conflict(format!(
                    "another tenantctl run holds {}; remove it if no run is active",
                    path.display()
                )));
            }
            debug!("Lock {} is held, retrying in {:?}", path.display(), delay);
            sleep(delay).await;
            delay = (delay * 2).min(Duration::from_millis(lock::POLL_MAX_MILLIS));
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}
