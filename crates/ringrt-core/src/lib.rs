//! # ringrt-core
//!
//! Core types for the ringrt single-threaded io_uring runtime.
//!
//! Nothing here touches the ring. The Linux-specific pieces (transport,
//! event loop, scheduler, operations) live in `ringrt`.
//!
//! ## Modules
//!
//! - `error` - Error types
//! - `arg` - Argument shapes accepted by operation wrappers
//! - `tag` - Correlation tag carried in `user_data`
//! - `config` - Queue-depth and run configuration
//! - `kprint` - Leveled stderr logging macros
//! - `env` - Environment variable utilities

pub mod error;
pub mod arg;
pub mod tag;
pub mod config;
pub mod kprint;
pub mod env;

pub use error::{ArgError, ErrorKind, RtError, RtResult};
pub use arg::{int_arg, DirFd, IntArg, OptValue, PathArg};
pub use tag::Tag;
pub use config::{LoopPolicy, RunConfig};
pub use env::{env_get, env_get_bool, env_get_str};
