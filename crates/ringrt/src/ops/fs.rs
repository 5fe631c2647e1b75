//! File and directory requests.

use std::ffi::CString;
use std::os::unix::io::RawFd;

use io_uring::{opcode, squeue, types};

use ringrt_core::arg::{int_arg, DirFd, IntArg, PathArg};
use ringrt_core::error::{ArgError, RtResult};

use super::{check, close_orphaned_fd};
use crate::op::{Operation, Request};

fn buf_len(name: &'static str, len: usize) -> Result<u32, ArgError> {
    u32::try_from(len).map_err(|_| ArgError::OutOfRange { name, value: len as i128 })
}

/// Echoes `value` back.
pub struct Nop {
    value: i32,
}

unsafe impl Request for Nop {
    type Output = i32;

    fn encode(&mut self) -> squeue::Entry {
        opcode::Nop::new().build()
    }

    fn complete(self: Box<Self>, res: i32) -> RtResult<i32> {
        check(res)?;
        Ok(self.value)
    }
}

/// Completes with `value` once it has made a trip through the ring.
pub fn nop(value: impl IntArg) -> RtResult<Operation<Nop>> {
    let value = int_arg("value", value)?;
    Operation::submit(Nop { value })
}

pub struct OpenAt {
    dir: RawFd,
    path: CString,
    flags: i32,
    mode: u32,
}

unsafe impl Request for OpenAt {
    type Output = RawFd;

    fn encode(&mut self) -> squeue::Entry {
        opcode::OpenAt::new(types::Fd(self.dir), self.path.as_ptr())
            .flags(self.flags)
            .mode(self.mode)
            .build()
    }

    fn complete(self: Box<Self>, res: i32) -> RtResult<RawFd> {
        check(res)
    }

    fn reap(self: Box<Self>, res: i32) {
        close_orphaned_fd(res);
    }
}

/// Open `path` relative to `dir` (`None`: working directory).
pub fn openat(
    dir: Option<RawFd>,
    path: impl Into<PathArg>,
    flags: impl IntArg,
    mode: impl IntArg,
) -> RtResult<Operation<OpenAt>> {
    Operation::submit(OpenAt {
        dir: DirFd::from(dir).raw(),
        path: path.into().into_cstring("path")?,
        flags: int_arg("flags", flags)?,
        mode: int_arg("mode", mode)?,
    })
}

pub struct Read {
    fd: RawFd,
    buf: Vec<u8>,
    offset: u64,
}

unsafe impl Request for Read {
    type Output = Vec<u8>;

    fn encode(&mut self) -> squeue::Entry {
        opcode::Read::new(types::Fd(self.fd), self.buf.as_mut_ptr(), self.buf.len() as u32)
            .offset(self.offset)
            .build()
    }

    fn complete(self: Box<Self>, res: i32) -> RtResult<Vec<u8>> {
        let n = check(res)? as usize;
        let mut buf = self.buf;
        buf.truncate(n);
        Ok(buf)
    }
}

/// Read up to `size` bytes at `offset`. An offset of -1 reads from the
/// current file position. The result is truncated to what was read.
pub fn read(fd: RawFd, size: impl IntArg, offset: impl IntArg) -> RtResult<Operation<Read>> {
    let size: u32 = int_arg("size", size)?;
    let offset: i64 = int_arg("offset", offset)?;
    Operation::submit(Read {
        fd,
        buf: vec![0; size as usize],
        offset: offset as u64,
    })
}

pub struct Write {
    fd: RawFd,
    data: Vec<u8>,
    offset: u64,
}

unsafe impl Request for Write {
    type Output = usize;

    fn encode(&mut self) -> squeue::Entry {
        opcode::Write::new(types::Fd(self.fd), self.data.as_ptr(), self.data.len() as u32)
            .offset(self.offset)
            .build()
    }

    fn complete(self: Box<Self>, res: i32) -> RtResult<usize> {
        Ok(check(res)? as usize)
    }
}

/// Write `data` at `offset` (-1: current position). Short writes are
/// reported as the byte count.
pub fn write(fd: RawFd, data: impl AsRef<[u8]>, offset: impl IntArg) -> RtResult<Operation<Write>> {
    let data = data.as_ref();
    buf_len("data", data.len())?;
    let offset: i64 = int_arg("offset", offset)?;
    Operation::submit(Write {
        fd,
        data: data.to_vec(),
        offset: offset as u64,
    })
}

pub struct Close {
    fd: RawFd,
}

unsafe impl Request for Close {
    type Output = ();

    fn encode(&mut self) -> squeue::Entry {
        opcode::Close::new(types::Fd(self.fd)).build()
    }

    fn complete(self: Box<Self>, res: i32) -> RtResult<()> {
        check(res).map(drop)
    }
}

pub fn close(fd: RawFd) -> RtResult<Operation<Close>> {
    Operation::submit(Close { fd })
}

pub struct Fsync {
    fd: RawFd,
    flags: u32,
}

unsafe impl Request for Fsync {
    type Output = ();

    fn encode(&mut self) -> squeue::Entry {
        opcode::Fsync::new(types::Fd(self.fd))
            .flags(types::FsyncFlags::from_bits_truncate(self.flags))
            .build()
    }

    fn complete(self: Box<Self>, res: i32) -> RtResult<()> {
        check(res).map(drop)
    }
}

/// `flags` may be `IORING_FSYNC_DATASYNC` (1) for fdatasync semantics.
pub fn fsync(fd: RawFd, flags: impl IntArg) -> RtResult<Operation<Fsync>> {
    Operation::submit(Fsync {
        fd,
        flags: int_arg("flags", flags)?,
    })
}

pub struct MkDirAt {
    dir: RawFd,
    path: CString,
    mode: u32,
}

unsafe impl Request for MkDirAt {
    type Output = ();

    fn encode(&mut self) -> squeue::Entry {
        opcode::MkDirAt::new(types::Fd(self.dir), self.path.as_ptr())
            .mode(self.mode)
            .build()
    }

    fn complete(self: Box<Self>, res: i32) -> RtResult<()> {
        check(res).map(drop)
    }
}

pub fn mkdirat(
    dir: Option<RawFd>,
    path: impl Into<PathArg>,
    mode: impl IntArg,
) -> RtResult<Operation<MkDirAt>> {
    Operation::submit(MkDirAt {
        dir: DirFd::from(dir).raw(),
        path: path.into().into_cstring("path")?,
        mode: int_arg("mode", mode)?,
    })
}

pub struct UnlinkAt {
    dir: RawFd,
    path: CString,
    flags: i32,
}

unsafe impl Request for UnlinkAt {
    type Output = ();

    fn encode(&mut self) -> squeue::Entry {
        opcode::UnlinkAt::new(types::Fd(self.dir), self.path.as_ptr())
            .flags(self.flags)
            .build()
    }

    fn complete(self: Box<Self>, res: i32) -> RtResult<()> {
        check(res).map(drop)
    }
}

/// Remove a file, or a directory with `AT_REMOVEDIR`.
pub fn unlinkat(
    dir: Option<RawFd>,
    path: impl Into<PathArg>,
    flags: impl IntArg,
) -> RtResult<Operation<UnlinkAt>> {
    Operation::submit(UnlinkAt {
        dir: DirFd::from(dir).raw(),
        path: path.into().into_cstring("path")?,
        flags: int_arg("flags", flags)?,
    })
}

pub struct SymlinkAt {
    target: CString,
    dir: RawFd,
    linkpath: CString,
}

unsafe impl Request for SymlinkAt {
    type Output = ();

    fn encode(&mut self) -> squeue::Entry {
        opcode::SymlinkAt::new(types::Fd(self.dir), self.target.as_ptr(), self.linkpath.as_ptr())
            .build()
    }

    fn complete(self: Box<Self>, res: i32) -> RtResult<()> {
        check(res).map(drop)
    }
}

/// Create `linkpath` (relative to `dir`) pointing at `target`.
pub fn symlinkat(
    target: impl Into<PathArg>,
    dir: Option<RawFd>,
    linkpath: impl Into<PathArg>,
) -> RtResult<Operation<SymlinkAt>> {
    Operation::submit(SymlinkAt {
        target: target.into().into_cstring("target")?,
        dir: DirFd::from(dir).raw(),
        linkpath: linkpath.into().into_cstring("linkpath")?,
    })
}

pub struct LinkAt {
    olddir: RawFd,
    oldpath: CString,
    newdir: RawFd,
    newpath: CString,
    flags: i32,
}

unsafe impl Request for LinkAt {
    type Output = ();

    fn encode(&mut self) -> squeue::Entry {
        opcode::LinkAt::new(
            types::Fd(self.olddir),
            self.oldpath.as_ptr(),
            types::Fd(self.newdir),
            self.newpath.as_ptr(),
        )
        .flags(self.flags)
        .build()
    }

    fn complete(self: Box<Self>, res: i32) -> RtResult<()> {
        check(res).map(drop)
    }
}

pub fn linkat(
    olddir: Option<RawFd>,
    oldpath: impl Into<PathArg>,
    newdir: Option<RawFd>,
    newpath: impl Into<PathArg>,
    flags: impl IntArg,
) -> RtResult<Operation<LinkAt>> {
    Operation::submit(LinkAt {
        olddir: DirFd::from(olddir).raw(),
        oldpath: oldpath.into().into_cstring("oldpath")?,
        newdir: DirFd::from(newdir).raw(),
        newpath: newpath.into().into_cstring("newpath")?,
        flags: int_arg("flags", flags)?,
    })
}

pub struct RenameAt {
    olddir: RawFd,
    oldpath: CString,
    newdir: RawFd,
    newpath: CString,
    flags: u32,
}

unsafe impl Request for RenameAt {
    type Output = ();

    fn encode(&mut self) -> squeue::Entry {
        opcode::RenameAt::new(
            types::Fd(self.olddir),
            self.oldpath.as_ptr(),
            types::Fd(self.newdir),
            self.newpath.as_ptr(),
        )
        .flags(self.flags)
        .build()
    }

    fn complete(self: Box<Self>, res: i32) -> RtResult<()> {
        check(res).map(drop)
    }
}

/// `flags` takes the `renameat2` flags (`RENAME_NOREPLACE`, ...).
pub fn renameat(
    olddir: Option<RawFd>,
    oldpath: impl Into<PathArg>,
    newdir: Option<RawFd>,
    newpath: impl Into<PathArg>,
    flags: impl IntArg,
) -> RtResult<Operation<RenameAt>> {
    Operation::submit(RenameAt {
        olddir: DirFd::from(olddir).raw(),
        oldpath: oldpath.into().into_cstring("oldpath")?,
        newdir: DirFd::from(newdir).raw(),
        newpath: newpath.into().into_cstring("newpath")?,
        flags: int_arg("flags", flags)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_loop::{create_event_loop, destroy_event_loop};
    use crate::run::run;
    use ringrt_core::config::{LoopPolicy, RunConfig};
    use ringrt_core::error::RtError;

    #[test]
    fn test_nop_needs_active_loop() {
        assert_eq!(nop(1).unwrap_err(), RtError::NoActiveLoop);
    }

    #[test]
    fn test_argument_errors_precede_submission() {
        let lp = create_event_loop(&LoopPolicy::default()).unwrap();
        assert!(matches!(nop(1u64 << 40), Err(RtError::Arg(ArgError::OutOfRange { .. }))));
        assert!(matches!(openat(None, "a\0b", 0, 0), Err(RtError::Arg(ArgError::NulByte { .. }))));
        assert!(matches!(read(0, -1, 0), Err(RtError::Arg(_))));
        assert_eq!(lp.inflight(), 0);
        destroy_event_loop();
    }

    #[test]
    fn test_take_result_without_suspending() {
        let lp = create_event_loop(&LoopPolicy::default()).unwrap();
        let mut op = nop(11).unwrap();
        assert!(op.take_result().is_none());
        let res = loop {
            if let Some(res) = op.take_result() {
                break res;
            }
            lp.turn(true).unwrap();
        };
        assert_eq!(res, Ok(11));
        assert_eq!(op.take_result(), Some(Err(RtError::AlreadyConsumed)));
        destroy_event_loop();
    }

    #[test]
    fn test_dropped_operation_is_reaped() {
        let lp = create_event_loop(&LoopPolicy::default()).unwrap();
        drop(nop(1).unwrap());
        assert_eq!(lp.inflight(), 1);
        lp.turn(true).unwrap();
        assert_eq!(lp.inflight(), 0);
        destroy_event_loop();
    }

    #[test]
    fn test_read_bad_fd() {
        let res = run(async { read(-1, 16, 0)?.await }, &RunConfig::default());
        assert_eq!(res, Err(RtError::Os(libc::EBADF)));
    }
}
