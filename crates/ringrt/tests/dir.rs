mod common;

use std::ffi::OsString;

use common::{drive, scratch_dir};
use ringrt::ops::{mkdirat, statx, symlinkat, unlinkat};
use ringrt::{ArgError, RtError};

#[test]
fn test_mkdir_then_remove() {
    let root = scratch_dir("mkdir");
    let sub = root.join("sub");

    let st = drive(async {
        mkdirat(None, &sub, 0o755)?.await?;
        statx(None, &sub, 0, libc::STATX_BASIC_STATS)?.await
    })
    .unwrap();
    assert!(st.is_dir());

    drive(async { unlinkat(None, &sub, libc::AT_REMOVEDIR)?.await }).unwrap();
    assert!(!sub.exists());
}

#[test]
fn test_mkdir_existing_fails() {
    let root = scratch_dir("exists");
    let res = drive(async { mkdirat(None, &root, 0o755)?.await });
    assert_eq!(res, Err(RtError::Os(libc::EEXIST)));
}

#[test]
fn test_unlink_directory_without_flag() {
    let root = scratch_dir("isdir");
    std::fs::create_dir(root.join("d")).unwrap();
    let res = drive(async { unlinkat(None, root.join("d"), 0)?.await });
    assert_eq!(res, Err(RtError::Os(libc::EISDIR)));
}

#[test]
fn test_symlink_is_not_followed_on_request() {
    let root = scratch_dir("symlink");
    let target = root.join("target");
    let link = root.join("link");
    std::fs::write(&target, b"t").unwrap();

    let (lst, st) = drive(async {
        symlinkat(&target, None, &link)?.await?;
        let lst = statx(None, &link, libc::AT_SYMLINK_NOFOLLOW, libc::STATX_BASIC_STATS)?.await?;
        let st = statx(None, &link, 0, libc::STATX_BASIC_STATS)?.await?;
        Ok((lst, st))
    })
    .unwrap();

    assert!(lst.is_symlink());
    assert!(st.is_file());
    assert_eq!(std::fs::read_link(&link).unwrap(), target);
}

#[test]
fn test_path_shapes_reach_the_same_file() {
    let root = scratch_dir("shapes");
    let path = root.join("p");
    std::fs::write(&path, b"12345").unwrap();
    let text = path.to_str().unwrap().to_owned();
    let bytes = text.clone().into_bytes();
    let os: OsString = path.clone().into_os_string();

    let sizes = drive(async {
        Ok(vec![
            statx(None, text.as_str(), 0, libc::STATX_SIZE)?.await?.size(),
            statx(None, bytes.as_slice(), 0, libc::STATX_SIZE)?.await?.size(),
            statx(None, os, 0, libc::STATX_SIZE)?.await?.size(),
            statx(None, path.as_path(), 0, libc::STATX_SIZE)?.await?.size(),
        ])
    })
    .unwrap();
    assert_eq!(sizes, vec![5, 5, 5, 5]);
}

#[test]
fn test_nul_in_path_is_an_argument_error() {
    let res = drive(async { mkdirat(None, "bad\0name", 0o700)?.await });
    assert_eq!(res, Err(RtError::Arg(ArgError::NulByte { name: "path" })));
}

#[test]
fn test_mode_out_of_range() {
    let res = drive(async { mkdirat(None, "/tmp/never", -1)?.await });
    assert!(matches!(res, Err(RtError::Arg(ArgError::OutOfRange { name: "mode", .. }))));
}
