//! Argument shapes accepted by operation wrappers
//!
//! Every wrapper funnels its inputs through the conversions here before a
//! request is encoded, so validation failures never reach the ring.
//!
//! - [`IntArg`]: integers and booleans, range-checked against the width of
//!   the kernel field they land in. Floats deliberately have no impl.
//! - [`PathArg`]: text, raw bytes or native paths, normalised to one
//!   NUL-terminated byte string.
//! - [`DirFd`]: directory anchor; absent means the working directory.
//! - [`OptValue`]: socket option payload, integer or raw bytes.

use std::ffi::{CString, OsStr, OsString};
use std::os::unix::ffi::OsStringExt;
use std::os::unix::io::RawFd;
use std::path::{Path, PathBuf};

use crate::error::ArgError;

/// Integer-like argument. `bool` coerces to 0/1.
pub trait IntArg: Copy {
    /// Widen losslessly; `None` if the value does not fit an `i128`.
    fn widen(self) -> Option<i128>;
}

macro_rules! impl_int_arg {
    ($($t:ty),*) => {
        $(
            impl IntArg for $t {
                #[inline]
                fn widen(self) -> Option<i128> {
                    Some(self as i128)
                }
            }
        )*
    };
}

impl_int_arg!(i8, i16, i32, i64, i128, isize, u8, u16, u32, u64, usize);

impl IntArg for bool {
    #[inline]
    fn widen(self) -> Option<i128> {
        Some(self as i128)
    }
}

impl IntArg for u128 {
    #[inline]
    fn widen(self) -> Option<i128> {
        i128::try_from(self).ok()
    }
}

/// Narrow `value` to the target width, or fail with `OutOfRange`.
pub fn int_arg<T>(name: &'static str, value: impl IntArg) -> Result<T, ArgError>
where
    T: TryFrom<i128>,
{
    let wide = value
        .widen()
        .ok_or(ArgError::OutOfRange { name, value: i128::MAX })?;
    T::try_from(wide).map_err(|_| ArgError::OutOfRange { name, value: wide })
}

/// A path in any of the accepted input shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathArg {
    Text(String),
    Bytes(Vec<u8>),
    Native(PathBuf),
}

impl PathArg {
    /// Canonical byte form handed to the kernel.
    pub fn into_cstring(self, name: &'static str) -> Result<CString, ArgError> {
        let bytes = match self {
            PathArg::Text(s) => s.into_bytes(),
            PathArg::Bytes(b) => b,
            PathArg::Native(p) => p.into_os_string().into_vec(),
        };
        CString::new(bytes).map_err(|_| ArgError::NulByte { name })
    }
}

impl From<&str> for PathArg {
    fn from(s: &str) -> Self {
        PathArg::Text(s.to_owned())
    }
}

impl From<String> for PathArg {
    fn from(s: String) -> Self {
        PathArg::Text(s)
    }
}

impl From<&String> for PathArg {
    fn from(s: &String) -> Self {
        PathArg::Text(s.clone())
    }
}

impl From<&[u8]> for PathArg {
    fn from(b: &[u8]) -> Self {
        PathArg::Bytes(b.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for PathArg {
    fn from(b: &[u8; N]) -> Self {
        PathArg::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for PathArg {
    fn from(b: Vec<u8>) -> Self {
        PathArg::Bytes(b)
    }
}

impl From<&Path> for PathArg {
    fn from(p: &Path) -> Self {
        PathArg::Native(p.to_path_buf())
    }
}

impl From<PathBuf> for PathArg {
    fn from(p: PathBuf) -> Self {
        PathArg::Native(p)
    }
}

impl From<&PathBuf> for PathArg {
    fn from(p: &PathBuf) -> Self {
        PathArg::Native(p.clone())
    }
}

impl From<&OsStr> for PathArg {
    fn from(s: &OsStr) -> Self {
        PathArg::Native(PathBuf::from(s))
    }
}

impl From<OsString> for PathArg {
    fn from(s: OsString) -> Self {
        PathArg::Native(PathBuf::from(s))
    }
}

/// Anchor for relative path resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DirFd {
    /// Resolve against the process working directory (`AT_FDCWD`).
    #[default]
    Cwd,
    Fd(RawFd),
}

impl DirFd {
    #[inline]
    pub fn raw(self) -> RawFd {
        match self {
            DirFd::Cwd => libc::AT_FDCWD,
            DirFd::Fd(fd) => fd,
        }
    }
}

impl From<Option<RawFd>> for DirFd {
    fn from(fd: Option<RawFd>) -> Self {
        fd.map_or(DirFd::Cwd, DirFd::Fd)
    }
}

impl From<RawFd> for DirFd {
    fn from(fd: RawFd) -> Self {
        DirFd::Fd(fd)
    }
}

/// Socket option payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptValue {
    /// Encoded as a native-endian C `int`.
    Int(i32),
    /// Passed to the kernel verbatim.
    Raw(Vec<u8>),
}

impl OptValue {
    /// Range-checked integer payload.
    pub fn int(value: impl IntArg) -> Result<Self, ArgError> {
        int_arg("optval", value).map(OptValue::Int)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            OptValue::Int(v) => v.to_ne_bytes().to_vec(),
            OptValue::Raw(b) => b,
        }
    }
}

impl From<i32> for OptValue {
    fn from(v: i32) -> Self {
        OptValue::Int(v)
    }
}

impl From<bool> for OptValue {
    fn from(v: bool) -> Self {
        OptValue::Int(v as i32)
    }
}

impl From<Vec<u8>> for OptValue {
    fn from(b: Vec<u8>) -> Self {
        OptValue::Raw(b)
    }
}

impl From<&[u8]> for OptValue {
    fn from(b: &[u8]) -> Self {
        OptValue::Raw(b.to_vec())
    }
}

impl<const N: usize> From<[u8; N]> for OptValue {
    fn from(b: [u8; N]) -> Self {
        OptValue::Raw(b.to_vec())
    }
}
