//! Error types for the ringrt runtime

use core::fmt;
use std::io;

/// Result type for runtime operations
pub type RtResult<T> = Result<T, RtError>;

/// Coarse classification of an [`RtError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad argument, raised before the ring is touched.
    Argument,
    /// The kernel (or the ring setup) reported an errno.
    Os,
    /// The caller broke the runtime's usage protocol.
    Protocol,
}

/// Errors that can occur in the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtError {
    /// Argument rejected during validation
    Arg(ArgError),

    /// OS error with errno (positive)
    Os(i32),

    /// No event loop is active on the calling thread
    NoActiveLoop,

    /// An event loop is already active on the calling thread
    LoopActive,

    /// The loop this handle belongs to has been destroyed
    LoopClosed,

    /// `run` called while the thread is already driving a coroutine
    Reentrant,

    /// Coroutine suspended without waiting on an operation
    InvalidSuspension,

    /// Coroutine waits on an operation but nothing is in flight
    Stalled,

    /// Operation result was already taken
    AlreadyConsumed,

    /// Submission queue full even after flushing
    RingFull,
}

impl RtError {
    /// Build an OS error from a negative completion result.
    #[inline]
    pub fn from_completion(res: i32) -> Self {
        RtError::Os(-res)
    }

    /// The errno carried by an OS error.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            RtError::Os(errno) => Some(*errno),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RtError::Arg(_) => ErrorKind::Argument,
            RtError::Os(_) => ErrorKind::Os,
            _ => ErrorKind::Protocol,
        }
    }
}

impl fmt::Display for RtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RtError::Arg(e) => write!(f, "invalid argument: {}", e),
            RtError::Os(errno) => write!(
                f,
                "OS error: {} (errno {})",
                io::Error::from_raw_os_error(*errno),
                errno
            ),
            RtError::NoActiveLoop => write!(f, "no event loop active on the current thread"),
            RtError::LoopActive => write!(f, "event loop is already active on the current thread"),
            RtError::LoopClosed => write!(f, "event loop was destroyed"),
            RtError::Reentrant => write!(f, "runtime is already running on the current thread"),
            RtError::InvalidSuspension => write!(f, "coroutine suspended on something other than an operation"),
            RtError::Stalled => write!(f, "coroutine suspended with no operation in flight"),
            RtError::AlreadyConsumed => write!(f, "operation result was already consumed"),
            RtError::RingFull => write!(f, "submission queue full"),
        }
    }
}

impl std::error::Error for RtError {}

impl From<ArgError> for RtError {
    fn from(e: ArgError) -> Self {
        RtError::Arg(e)
    }
}

impl From<io::Error> for RtError {
    fn from(e: io::Error) -> Self {
        RtError::Os(e.raw_os_error().unwrap_or(libc::EIO))
    }
}

impl From<RtError> for io::Error {
    fn from(e: RtError) -> Self {
        match e {
            RtError::Os(errno) => io::Error::from_raw_os_error(errno),
            RtError::Arg(_) => io::Error::new(io::ErrorKind::InvalidInput, e),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

/// Argument validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgError {
    /// Integer does not fit the kernel field
    OutOfRange { name: &'static str, value: i128 },

    /// Path contains an interior NUL byte
    NulByte { name: &'static str },

    /// Socket address could not be encoded
    BadAddress(String),
}

impl fmt::Display for ArgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgError::OutOfRange { name, value } => {
                write!(f, "{} out of range: {}", name, value)
            }
            ArgError::NulByte { name } => write!(f, "{} contains a NUL byte", name),
            ArgError::BadAddress(why) => write!(f, "bad socket address: {}", why),
        }
    }
}
