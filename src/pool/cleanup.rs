//! Cleanup handler chain, plus two canonical file-cleanup callbacks for
//! embedders to register.

use std::cell::Cell;
use std::path::PathBuf;
use std::ptr::NonNull;

use crate::log::{pool_debug, pool_error, Log};

/// A cleanup callback. Must not fail and must not touch the pool that
/// owns it — that pool's memory is in the process of being torn down
/// while the callback runs.
///
/// # Safety
/// `data` must be a valid pointer of whatever type the handler expects,
/// for the duration of the call.
pub type CleanupHandler = unsafe fn(*mut u8);

/// One entry in the pool's cleanup chain. Storage is pool-backed.
///
/// Registration is head-insert ([`super::Pool::cleanup_add`]); execution at
/// [`super::Pool::drop`] walks head to tail, so handlers run in LIFO order
/// of registration — the standard scoped-resource discipline.
pub(crate) struct CleanupNode {
    pub(crate) handler: Cell<Option<CleanupHandler>>,
    pub(crate) data: Cell<*mut u8>,
    pub(crate) next: Cell<Option<NonNull<CleanupNode>>>,
}

/// Data payload for [`close_fd`] and [`close_and_delete_file`].
#[cfg(unix)]
pub struct FileCleanup {
    pub fd: std::os::fd::RawFd,
    pub name: Option<PathBuf>,
    pub log: Log,
}

/// Closes `data.fd`, logging (never panicking) on failure.
///
/// # Safety
/// `data` must point to a live, exclusively-owned [`FileCleanup`].
#[cfg(unix)]
pub unsafe fn close_fd(data: *mut u8) {
    let payload = unsafe { &*(data as *const FileCleanup) };
    // SAFETY: the fd is owned by this cleanup entry and not touched again.
    // `File`'s `Drop` closes it; std swallows the close(2) errno, so there
    // is nothing further to surface here beyond the fact that it ran.
    let file = unsafe { <std::fs::File as std::os::fd::FromRawFd>::from_raw_fd(payload.fd) };
    drop(file);
    pool_debug!(payload.log, "close_fd: closed fd {}", payload.fd);
}

/// Closes `data.fd` and, if `data.name` is set, unlinks it. Errors are
/// logged, never propagated — cleanup handlers must not fail.
///
/// # Safety
/// `data` must point to a live, exclusively-owned [`FileCleanup`].
#[cfg(unix)]
pub unsafe fn close_and_delete_file(data: *mut u8) {
    let payload = unsafe { &*(data as *const FileCleanup) };
    unsafe { close_fd(data) };
    if let Some(name) = &payload.name {
        if let Err(err) = std::fs::remove_file(name) {
            pool_error!(
                payload.log,
                "close_and_delete_file: failed to remove {}: {err}",
                name.display()
            );
        }
    }
}
