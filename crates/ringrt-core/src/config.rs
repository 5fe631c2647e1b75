//! Loop and run configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder setters
//! 2. Environment variables (`from_env()`)
//! 3. Library defaults
//!
//! ```rust,ignore
//! use ringrt_core::config::{LoopPolicy, RunConfig};
//!
//! let policy = LoopPolicy::from_env().sq_entries(256);
//! let conf = RunConfig::from_env().sq_entries(16);
//! ```

use crate::env::env_get;

pub mod defaults {
    /// Submission queue depth requested when nothing else is configured.
    pub const SQ_ENTRIES: u32 = 64;
    /// 0 lets the transport pick the completion queue depth.
    pub const CQ_ENTRIES: u32 = 0;
}

/// Queue-depth configuration consumed by event loop construction.
///
/// `sq_entries == 0` is passed through to the kernel, which rejects it.
/// `cq_entries == 0` selects the transport default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopPolicy {
    pub sq_entries: u32,
    pub cq_entries: u32,
}

impl Default for LoopPolicy {
    fn default() -> Self {
        Self {
            sq_entries: defaults::SQ_ENTRIES,
            cq_entries: defaults::CQ_ENTRIES,
        }
    }
}

impl LoopPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `RINGRT_SQ_ENTRIES` / `RINGRT_CQ_ENTRIES`.
    pub fn from_env() -> Self {
        Self {
            sq_entries: env_get("RINGRT_SQ_ENTRIES", defaults::SQ_ENTRIES),
            cq_entries: env_get("RINGRT_CQ_ENTRIES", defaults::CQ_ENTRIES),
        }
    }

    pub fn sq_entries(mut self, n: u32) -> Self {
        self.sq_entries = n;
        self
    }

    pub fn cq_entries(mut self, n: u32) -> Self {
        self.cq_entries = n;
        self
    }
}

/// Per-invocation parameters for `run`.
///
/// Only consulted when the calling thread has no active loop yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    pub sq_entries: u32,
    pub cq_entries: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        let policy = LoopPolicy::default();
        Self {
            sq_entries: policy.sq_entries,
            cq_entries: policy.cq_entries,
        }
    }
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let policy = LoopPolicy::from_env();
        Self {
            sq_entries: policy.sq_entries,
            cq_entries: policy.cq_entries,
        }
    }

    pub fn sq_entries(mut self, n: u32) -> Self {
        self.sq_entries = n;
        self
    }

    pub fn cq_entries(mut self, n: u32) -> Self {
        self.cq_entries = n;
        self
    }

    /// The loop policy used when `run` has to build a loop.
    pub fn policy(&self) -> LoopPolicy {
        LoopPolicy {
            sq_entries: self.sq_entries,
            cq_entries: self.cq_entries,
        }
    }
}
