//! `statx` request and its read-only result record.

use std::ffi::CString;
use std::os::unix::io::RawFd;

use io_uring::{opcode, squeue, types};

use ringrt_core::arg::{int_arg, DirFd, IntArg, PathArg};
use ringrt_core::error::RtResult;

use super::check;
use crate::op::{Operation, Request};

/// File metadata returned by [`statx`].
///
/// Fields are only reachable through getters, so a result cannot be
/// altered after the kernel filled it in.
#[derive(Clone, Copy)]
pub struct Statx {
    raw: libc::statx,
}

impl Statx {
    /// Bitmask of the fields the kernel actually filled (`STATX_*`).
    pub fn mask(&self) -> u32 {
        self.raw.stx_mask
    }

    pub fn size(&self) -> u64 {
        self.raw.stx_size
    }

    pub fn uid(&self) -> u32 {
        self.raw.stx_uid
    }

    pub fn gid(&self) -> u32 {
        self.raw.stx_gid
    }

    pub fn mode(&self) -> u16 {
        self.raw.stx_mode
    }

    pub fn nlink(&self) -> u32 {
        self.raw.stx_nlink
    }

    pub fn ino(&self) -> u64 {
        self.raw.stx_ino
    }

    pub fn blksize(&self) -> u32 {
        self.raw.stx_blksize
    }

    pub fn blocks(&self) -> u64 {
        self.raw.stx_blocks
    }

    pub fn atime(&self) -> i64 {
        self.raw.stx_atime.tv_sec
    }

    pub fn atime_nsec(&self) -> u32 {
        self.raw.stx_atime.tv_nsec
    }

    pub fn mtime(&self) -> i64 {
        self.raw.stx_mtime.tv_sec
    }

    pub fn mtime_nsec(&self) -> u32 {
        self.raw.stx_mtime.tv_nsec
    }

    pub fn ctime(&self) -> i64 {
        self.raw.stx_ctime.tv_sec
    }

    pub fn ctime_nsec(&self) -> u32 {
        self.raw.stx_ctime.tv_nsec
    }

    pub fn dev_major(&self) -> u32 {
        self.raw.stx_dev_major
    }

    pub fn dev_minor(&self) -> u32 {
        self.raw.stx_dev_minor
    }

    pub fn rdev_major(&self) -> u32 {
        self.raw.stx_rdev_major
    }

    pub fn rdev_minor(&self) -> u32 {
        self.raw.stx_rdev_minor
    }

    pub fn is_dir(&self) -> bool {
        u32::from(self.mode()) & libc::S_IFMT == libc::S_IFDIR
    }

    pub fn is_file(&self) -> bool {
        u32::from(self.mode()) & libc::S_IFMT == libc::S_IFREG
    }

    pub fn is_symlink(&self) -> bool {
        u32::from(self.mode()) & libc::S_IFMT == libc::S_IFLNK
    }
}

impl std::fmt::Debug for Statx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statx")
            .field("ino", &self.ino())
            .field("mode", &format_args!("{:o}", self.mode()))
            .field("nlink", &self.nlink())
            .field("uid", &self.uid())
            .field("gid", &self.gid())
            .field("size", &self.size())
            .field("mtime", &self.mtime())
            .finish_non_exhaustive()
    }
}

pub struct StatxRequest {
    dir: RawFd,
    path: CString,
    flags: i32,
    mask: u32,
    buf: libc::statx,
}

unsafe impl Request for StatxRequest {
    type Output = Statx;

    fn encode(&mut self) -> squeue::Entry {
        let buf = &mut self.buf as *mut libc::statx as *mut types::statx;
        opcode::Statx::new(types::Fd(self.dir), self.path.as_ptr(), buf)
            .flags(self.flags)
            .mask(self.mask)
            .build()
    }

    fn complete(self: Box<Self>, res: i32) -> RtResult<Statx> {
        check(res)?;
        Ok(Statx { raw: self.buf })
    }
}

/// Query metadata of `path` relative to `dir`.
///
/// `flags` takes `AT_*` flags (`AT_SYMLINK_NOFOLLOW`, `AT_EMPTY_PATH`, ...);
/// `mask` selects fields, e.g. `libc::STATX_BASIC_STATS`.
pub fn statx(
    dir: Option<RawFd>,
    path: impl Into<PathArg>,
    flags: impl IntArg,
    mask: impl IntArg,
) -> RtResult<Operation<StatxRequest>> {
    Operation::submit(StatxRequest {
        dir: DirFd::from(dir).raw(),
        path: path.into().into_cstring("path")?,
        flags: int_arg("flags", flags)?,
        mask: int_arg("mask", mask)?,
        // SAFETY: statx is plain old data; all-zero is a valid value.
        buf: unsafe { std::mem::zeroed() },
    })
}
