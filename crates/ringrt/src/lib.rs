//! # ringrt
//!
//! Single-threaded asynchronous I/O on io_uring.
//!
//! Each thread owns at most one event loop. Operations are submitted to the
//! loop's ring as soon as they are created and awaited like any future;
//! [`run`] drives a root future until it finishes, blocking in the kernel
//! whenever the root waits on an operation.
//!
//! ## Quick Start
//!
//! ```ignore
//! use ringrt::{ops, run, RunConfig};
//!
//! let data = run(
//!     async {
//!         let fd = ops::openat(None, "/etc/hostname", libc::O_RDONLY, 0)?.await?;
//!         let data = ops::read(fd, 256, 0)?.await?;
//!         ops::close(fd)?.await?;
//!         Ok(data)
//!     },
//!     &RunConfig::default(),
//! )?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//!  run(root) ──poll──► root future ──creates──► Operation<R>
//!      │                                          │ submit
//!      │ turn(block)                              ▼
//!      └────────────► EventLoop ── OpTable ── RingTransport ── io_uring
//! ```
//!
//! Several operations can be in flight at once: create them first, await
//! them afterwards.

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        pub mod ring;
        pub mod event_loop;
        pub mod op;
        pub mod run;
        pub mod ops;

        pub use event_loop::{create_event_loop, destroy_event_loop, get_event_loop, EventLoop};
        pub use op::{Operation, Request};
        pub use run::{block_on, run, yield_now};
        pub use ring::{RingCompletion, RingTransport};
    } else {
        compile_error!("ringrt requires Linux io_uring");
    }
}

pub use ringrt_core::{
    ArgError, DirFd, ErrorKind, IntArg, LoopPolicy, OptValue, PathArg, RtError, RtResult,
    RunConfig, Tag,
};
pub use ringrt_core::kprint;
