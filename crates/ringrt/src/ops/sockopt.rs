//! Socket options.
//!
//! The thread's loop is resolved first; only then does the syscall run, and
//! its outcome rides back on a NOP so options follow the same await/consume
//! rules as every other operation. Without a loop the socket is untouched.

use std::os::unix::io::RawFd;

use io_uring::{opcode, squeue};

use ringrt_core::arg::{int_arg, IntArg, OptValue};
use ringrt_core::error::RtResult;

use super::{check, syscall_result};
use crate::event_loop::get_event_loop;
use crate::op::{Operation, Request};

/// Result of a syscall made at construction time, delivered through a NOP.
pub struct Deferred {
    res: i32,
}

unsafe impl Request for Deferred {
    type Output = ();

    fn encode(&mut self) -> squeue::Entry {
        opcode::Nop::new().build()
    }

    fn complete(self: Box<Self>, res: i32) -> RtResult<()> {
        check(res)?;
        check(self.res).map(drop)
    }
}

/// Set an option from an integer (`OptValue::Int`) or raw bytes.
pub fn setsockopt(
    fd: RawFd,
    level: impl IntArg,
    name: impl IntArg,
    value: impl Into<OptValue>,
) -> RtResult<Operation<Deferred>> {
    let level: i32 = int_arg("level", level)?;
    let name: i32 = int_arg("optname", name)?;
    let bytes = value.into().into_bytes();
    let lp = get_event_loop()?;
    let rc = unsafe {
        libc::setsockopt(
            fd,
            level,
            name,
            bytes.as_ptr() as *const libc::c_void,
            bytes.len() as libc::socklen_t,
        )
    };
    Operation::submit_on(lp, Deferred { res: syscall_result(rc) })
}

/// Captured `getsockopt` outcome.
pub struct SockOpt<T: 'static> {
    res: i32,
    buf: Vec<u8>,
    decode: fn(Vec<u8>) -> T,
}

unsafe impl<T: 'static> Request for SockOpt<T> {
    type Output = T;

    fn encode(&mut self) -> squeue::Entry {
        opcode::Nop::new().build()
    }

    fn complete(self: Box<Self>, res: i32) -> RtResult<T> {
        check(res)?;
        check(self.res)?;
        Ok((self.decode)(self.buf))
    }
}

fn fetch<T: 'static>(
    fd: RawFd,
    level: i32,
    name: i32,
    len: usize,
    decode: fn(Vec<u8>) -> T,
) -> RtResult<Operation<SockOpt<T>>> {
    let lp = get_event_loop()?;
    let mut buf = vec![0u8; len];
    let mut optlen = len as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            fd,
            level,
            name,
            buf.as_mut_ptr() as *mut libc::c_void,
            &mut optlen,
        )
    };
    let res = syscall_result(rc);
    if res >= 0 {
        buf.truncate(optlen as usize);
    }
    Operation::submit_on(lp, SockOpt { res, buf, decode })
}

fn decode_int(buf: Vec<u8>) -> i32 {
    let mut raw = [0u8; 4];
    let n = buf.len().min(raw.len());
    raw[..n].copy_from_slice(&buf[..n]);
    i32::from_ne_bytes(raw)
}

/// Read an integer option.
pub fn getsockopt(
    fd: RawFd,
    level: impl IntArg,
    name: impl IntArg,
) -> RtResult<Operation<SockOpt<i32>>> {
    fetch(
        fd,
        int_arg("level", level)?,
        int_arg("optname", name)?,
        std::mem::size_of::<libc::c_int>(),
        decode_int,
    )
}

/// Read an option as raw bytes, at most `len` of them.
pub fn getsockopt_raw(
    fd: RawFd,
    level: impl IntArg,
    name: impl IntArg,
    len: impl IntArg,
) -> RtResult<Operation<SockOpt<Vec<u8>>>> {
    let len: u32 = int_arg("optlen", len)?;
    fetch(
        fd,
        int_arg("level", level)?,
        int_arg("optname", name)?,
        len as usize,
        |buf| buf,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_int() {
        assert_eq!(decode_int(7i32.to_ne_bytes().to_vec()), 7);
        assert_eq!(decode_int(vec![]), 0);
    }
}
