//! Operation catalogue
//!
//! Each wrapper validates its arguments, boxes a [`Request`] and enqueues it
//! on the thread's active loop right away, returning an [`Operation`] to
//! await. Argument errors are returned before anything touches the ring.
//!
//! | group    | wrappers                                                        |
//! |----------|-----------------------------------------------------------------|
//! | misc     | `nop`                                                           |
//! | file I/O | `openat`, `read`, `write`, `close`, `fsync`, `statx`            |
//! | dirs     | `mkdirat`, `unlinkat`, `symlinkat`, `linkat`, `renameat`        |
//! | sockets  | `socket`, `bind`, `listen`, `connect`, `accept`, `send`, `recv` |
//! | sockopt  | `setsockopt`, `getsockopt`, `getsockopt_raw`                    |
//!
//! The socket-option calls run their syscall when the operation is created,
//! once the thread's loop is known, and report the outcome through a NOP
//! carrying the operation's tag.
//!
//! [`Request`]: crate::op::Request
//! [`Operation`]: crate::op::Operation

use std::os::unix::io::RawFd;

use ringrt_core::error::{RtError, RtResult};

pub mod fs;
pub mod net;
pub mod sockopt;
pub mod statx;

pub use fs::{close, fsync, linkat, mkdirat, nop, openat, read, renameat, symlinkat, unlinkat, write};
pub use net::{accept, bind, connect, listen, recv, send, socket, SockAddrArg};
pub use sockopt::{getsockopt, getsockopt_raw, setsockopt};
pub use statx::{statx, Statx};

/// Negative completion results carry `-errno`.
#[inline]
pub(crate) fn check(res: i32) -> RtResult<i32> {
    if res < 0 {
        Err(RtError::from_completion(res))
    } else {
        Ok(res)
    }
}

/// Outcome of a syscall made directly, in completion-result form.
pub(crate) fn syscall_result(rc: libc::c_int) -> i32 {
    if rc < 0 {
        -std::io::Error::last_os_error()
            .raw_os_error()
            .unwrap_or(libc::EIO)
    } else {
        rc
    }
}

/// Close a descriptor produced for a request nobody is waiting on.
pub(crate) fn close_orphaned_fd(res: i32) {
    if res >= 0 {
        unsafe {
            libc::close(res as RawFd);
        }
    }
}
