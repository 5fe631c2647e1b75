//! Socket requests.

use std::net::{SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

use io_uring::{opcode, squeue, types};
use nix::sys::socket::{SockaddrIn, SockaddrIn6, SockaddrLike, SockaddrStorage, UnixAddr};

use ringrt_core::arg::{int_arg, IntArg};
use ringrt_core::error::{ArgError, RtResult};

use super::{check, close_orphaned_fd};
use crate::op::{Operation, Request};

/// Socket address accepted by `bind` and `connect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockAddrArg {
    Inet(SocketAddr),
    /// `AF_UNIX` path.
    Unix(PathBuf),
}

impl From<SocketAddr> for SockAddrArg {
    fn from(addr: SocketAddr) -> Self {
        SockAddrArg::Inet(addr)
    }
}

impl From<SocketAddrV4> for SockAddrArg {
    fn from(addr: SocketAddrV4) -> Self {
        SockAddrArg::Inet(addr.into())
    }
}

impl From<SocketAddrV6> for SockAddrArg {
    fn from(addr: SocketAddrV6) -> Self {
        SockAddrArg::Inet(addr.into())
    }
}

impl From<&Path> for SockAddrArg {
    fn from(path: &Path) -> Self {
        SockAddrArg::Unix(path.to_path_buf())
    }
}

impl From<PathBuf> for SockAddrArg {
    fn from(path: PathBuf) -> Self {
        SockAddrArg::Unix(path)
    }
}

/// Kernel encoding of a [`SockAddrArg`].
pub(crate) enum RawAddr {
    V4(SockaddrIn),
    V6(SockaddrIn6),
    Unix(UnixAddr),
}

impl RawAddr {
    pub(crate) fn encode(addr: SockAddrArg) -> Result<Self, ArgError> {
        Ok(match addr {
            SockAddrArg::Inet(SocketAddr::V4(v4)) => RawAddr::V4(SockaddrIn::from(v4)),
            SockAddrArg::Inet(SocketAddr::V6(v6)) => RawAddr::V6(SockaddrIn6::from(v6)),
            SockAddrArg::Unix(path) => RawAddr::Unix(
                UnixAddr::new(path.as_path())
                    .map_err(|e| ArgError::BadAddress(format!("{}: {}", path.display(), e)))?,
            ),
        })
    }

    pub(crate) fn as_ptr(&self) -> *const libc::sockaddr {
        match self {
            RawAddr::V4(a) => SockaddrLike::as_ptr(a),
            RawAddr::V6(a) => SockaddrLike::as_ptr(a),
            RawAddr::Unix(a) => SockaddrLike::as_ptr(a),
        }
    }

    pub(crate) fn len(&self) -> libc::socklen_t {
        match self {
            RawAddr::V4(a) => SockaddrLike::len(a),
            RawAddr::V6(a) => SockaddrLike::len(a),
            RawAddr::Unix(a) => SockaddrLike::len(a),
        }
    }
}

/// Decode an address the kernel wrote. Non-IP families yield `None`.
fn decode_addr(storage: &libc::sockaddr_storage, len: libc::socklen_t) -> Option<SocketAddr> {
    let ptr = storage as *const libc::sockaddr_storage as *const libc::sockaddr;
    let addr = unsafe { SockaddrStorage::from_raw(ptr, Some(len))? };
    if let Some(v4) = addr.as_sockaddr_in() {
        return Some(SocketAddr::V4(SocketAddrV4::from(*v4)));
    }
    addr.as_sockaddr_in6()
        .map(|v6| SocketAddr::V6(SocketAddrV6::from(*v6)))
}

pub struct Socket {
    domain: i32,
    socket_type: i32,
    protocol: i32,
}

unsafe impl Request for Socket {
    type Output = RawFd;

    fn encode(&mut self) -> squeue::Entry {
        opcode::Socket::new(self.domain, self.socket_type, self.protocol).build()
    }

    fn complete(self: Box<Self>, res: i32) -> RtResult<RawFd> {
        check(res)
    }

    fn reap(self: Box<Self>, res: i32) {
        close_orphaned_fd(res);
    }
}

pub fn socket(
    domain: impl IntArg,
    socket_type: impl IntArg,
    protocol: impl IntArg,
) -> RtResult<Operation<Socket>> {
    Operation::submit(Socket {
        domain: int_arg("domain", domain)?,
        socket_type: int_arg("type", socket_type)?,
        protocol: int_arg("protocol", protocol)?,
    })
}

pub struct Bind {
    fd: RawFd,
    addr: RawAddr,
}

unsafe impl Request for Bind {
    type Output = ();

    fn encode(&mut self) -> squeue::Entry {
        opcode::Bind::new(types::Fd(self.fd), self.addr.as_ptr(), self.addr.len()).build()
    }

    fn complete(self: Box<Self>, res: i32) -> RtResult<()> {
        check(res).map(drop)
    }
}

pub fn bind(fd: RawFd, addr: impl Into<SockAddrArg>) -> RtResult<Operation<Bind>> {
    Operation::submit(Bind {
        fd,
        addr: RawAddr::encode(addr.into())?,
    })
}

pub struct Listen {
    fd: RawFd,
    backlog: i32,
}

unsafe impl Request for Listen {
    type Output = ();

    fn encode(&mut self) -> squeue::Entry {
        opcode::Listen::new(types::Fd(self.fd), self.backlog).build()
    }

    fn complete(self: Box<Self>, res: i32) -> RtResult<()> {
        check(res).map(drop)
    }
}

pub fn listen(fd: RawFd, backlog: impl IntArg) -> RtResult<Operation<Listen>> {
    Operation::submit(Listen {
        fd,
        backlog: int_arg("backlog", backlog)?,
    })
}

pub struct Connect {
    fd: RawFd,
    addr: RawAddr,
}

unsafe impl Request for Connect {
    type Output = ();

    fn encode(&mut self) -> squeue::Entry {
        opcode::Connect::new(types::Fd(self.fd), self.addr.as_ptr(), self.addr.len()).build()
    }

    fn complete(self: Box<Self>, res: i32) -> RtResult<()> {
        check(res).map(drop)
    }
}

pub fn connect(fd: RawFd, addr: impl Into<SockAddrArg>) -> RtResult<Operation<Connect>> {
    Operation::submit(Connect {
        fd,
        addr: RawAddr::encode(addr.into())?,
    })
}

pub struct Accept {
    fd: RawFd,
    flags: i32,
    storage: libc::sockaddr_storage,
    len: libc::socklen_t,
}

unsafe impl Request for Accept {
    type Output = (RawFd, Option<SocketAddr>);

    fn encode(&mut self) -> squeue::Entry {
        let storage = &mut self.storage as *mut libc::sockaddr_storage as *mut libc::sockaddr;
        opcode::Accept::new(types::Fd(self.fd), storage, &mut self.len)
            .flags(self.flags)
            .build()
    }

    fn complete(self: Box<Self>, res: i32) -> RtResult<(RawFd, Option<SocketAddr>)> {
        let fd = check(res)?;
        Ok((fd, decode_addr(&self.storage, self.len)))
    }

    fn reap(self: Box<Self>, res: i32) {
        close_orphaned_fd(res);
    }
}

/// Accept one connection. `flags` takes `SOCK_NONBLOCK` / `SOCK_CLOEXEC`.
///
/// The peer address is decoded for IPv4 and IPv6 peers only.
pub fn accept(fd: RawFd, flags: impl IntArg) -> RtResult<Operation<Accept>> {
    Operation::submit(Accept {
        fd,
        flags: int_arg("flags", flags)?,
        // SAFETY: sockaddr_storage is plain old data.
        storage: unsafe { std::mem::zeroed() },
        len: std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t,
    })
}

pub struct SendBuf {
    fd: RawFd,
    data: Vec<u8>,
    flags: i32,
}

unsafe impl Request for SendBuf {
    type Output = usize;

    fn encode(&mut self) -> squeue::Entry {
        opcode::Send::new(types::Fd(self.fd), self.data.as_ptr(), self.data.len() as u32)
            .flags(self.flags)
            .build()
    }

    fn complete(self: Box<Self>, res: i32) -> RtResult<usize> {
        Ok(check(res)? as usize)
    }
}

/// Send `data`; the result is the number of bytes the kernel took.
pub fn send(fd: RawFd, data: impl AsRef<[u8]>, flags: impl IntArg) -> RtResult<Operation<SendBuf>> {
    let data = data.as_ref();
    if u32::try_from(data.len()).is_err() {
        return Err(ArgError::OutOfRange { name: "data", value: data.len() as i128 }.into());
    }
    Operation::submit(SendBuf {
        fd,
        data: data.to_vec(),
        flags: int_arg("flags", flags)?,
    })
}

pub struct RecvBuf {
    fd: RawFd,
    buf: Vec<u8>,
    flags: i32,
}

unsafe impl Request for RecvBuf {
    type Output = Vec<u8>;

    fn encode(&mut self) -> squeue::Entry {
        opcode::Recv::new(types::Fd(self.fd), self.buf.as_mut_ptr(), self.buf.len() as u32)
            .flags(self.flags)
            .build()
    }

    fn complete(self: Box<Self>, res: i32) -> RtResult<Vec<u8>> {
        let n = check(res)? as usize;
        let mut buf = self.buf;
        buf.truncate(n);
        Ok(buf)
    }
}

/// Receive up to `size` bytes. An empty result means the peer shut down.
pub fn recv(fd: RawFd, size: impl IntArg, flags: impl IntArg) -> RtResult<Operation<RecvBuf>> {
    let size: u32 = int_arg("size", size)?;
    Operation::submit(RecvBuf {
        fd,
        buf: vec![0; size as usize],
        flags: int_arg("flags", flags)?,
    })
}
