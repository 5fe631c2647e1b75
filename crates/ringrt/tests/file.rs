mod common;

use common::{drive, scratch_dir};
use ringrt::ops::{close, fsync, linkat, openat, read, renameat, statx, unlinkat, write};
use ringrt::{create_event_loop, destroy_event_loop, LoopPolicy, RtError};

const RW_CREATE: i32 = libc::O_RDWR | libc::O_CREAT | libc::O_TRUNC;

#[test]
fn test_write_then_read_back() {
    let dir = scratch_dir("rw");
    let path = dir.join("data.bin");

    let data = drive(async {
        let fd = openat(None, path.as_path(), RW_CREATE, 0o644)?.await?;
        let written = write(fd, b"hello, ring", 0)?.await?;
        assert_eq!(written, 11);
        fsync(fd, 0)?.await?;
        let data = read(fd, 64, 0)?.await?;
        close(fd)?.await?;
        Ok(data)
    })
    .unwrap();

    assert_eq!(data, b"hello, ring");
    assert_eq!(std::fs::read(&path).unwrap(), b"hello, ring");
}

#[test]
fn test_read_at_offset_and_current_position() {
    let dir = scratch_dir("offset");
    let path = dir.join("f");
    std::fs::write(&path, b"0123456789").unwrap();

    let (mid, seq1, seq2) = drive(async {
        let fd = openat(None, &path, libc::O_RDONLY, 0)?.await?;
        let mid = read(fd, 3, 4)?.await?;
        let seq1 = read(fd, 4, -1)?.await?;
        let seq2 = read(fd, 4, -1)?.await?;
        close(fd)?.await?;
        Ok((mid, seq1, seq2))
    })
    .unwrap();

    assert_eq!(mid, b"456");
    assert_eq!(seq1, b"0123");
    assert_eq!(seq2, b"4567");
}

#[test]
fn test_short_read_at_eof() {
    let dir = scratch_dir("eof");
    let path = dir.join("small");
    std::fs::write(&path, b"abc").unwrap();

    let data = drive(async {
        let fd = openat(None, path.to_str().unwrap(), libc::O_RDONLY, 0)?.await?;
        let data = read(fd, 4096, 0)?.await?;
        close(fd)?.await?;
        Ok(data)
    })
    .unwrap();
    assert_eq!(data, b"abc");
}

#[test]
fn test_operations_created_before_await() {
    let dir = scratch_dir("batch");
    let path = dir.join("batch");

    drive(async {
        let fd = openat(None, &path, RW_CREATE, 0o600)?.await?;
        let a = write(fd, b"aaaa", 0)?;
        let b = write(fd, b"bbbb", 4)?;
        let c = write(fd, b"cccc", 8)?;
        assert_eq!(c.await?, 4);
        assert_eq!(a.await?, 4);
        assert_eq!(b.await?, 4);
        close(fd)?.await
    })
    .unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"aaaabbbbcccc");
}

#[test]
fn test_double_await_is_rejected() {
    let dir = scratch_dir("twice");
    let path = dir.join("f");
    std::fs::write(&path, b"x").unwrap();

    drive(async {
        let mut op = openat(None, &path, libc::O_RDONLY, 0)?;
        let fd = (&mut op).await?;
        assert_eq!((&mut op).await, Err(RtError::AlreadyConsumed));
        assert!(op.is_consumed());
        close(fd)?.await
    })
    .unwrap();
}

#[test]
fn test_failed_result_is_also_consumed() {
    drive(async {
        let mut op = read(-1, 8, 0)?;
        assert_eq!((&mut op).await, Err(RtError::Os(libc::EBADF)));
        assert_eq!((&mut op).await, Err(RtError::AlreadyConsumed));
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_open_missing_file() {
    let dir = scratch_dir("missing");
    let res = drive(async { openat(None, dir.join("nope"), libc::O_RDONLY, 0)?.await });
    assert_eq!(res.unwrap_err().raw_os_error(), Some(libc::ENOENT));
}

#[test]
fn test_openat_relative_to_dir_fd() {
    let dir = scratch_dir("anchor");
    std::fs::write(dir.join("inner"), b"anchored").unwrap();

    let data = drive(async {
        let dfd = openat(None, &dir, libc::O_RDONLY | libc::O_DIRECTORY, 0)?.await?;
        let fd = openat(Some(dfd), "inner", libc::O_RDONLY, 0)?.await?;
        let data = read(fd, 16, 0)?.await?;
        close(fd)?.await?;
        close(dfd)?.await?;
        Ok(data)
    })
    .unwrap();
    assert_eq!(data, b"anchored");
}

#[test]
fn test_statx_fresh_file() {
    let dir = scratch_dir("statx");
    let path = dir.join("f");
    std::fs::write(&path, vec![7u8; 1234]).unwrap();

    let st = drive(async { statx(None, &path, 0, libc::STATX_BASIC_STATS)?.await }).unwrap();
    assert!(st.is_file());
    assert_eq!(st.size(), 1234);
    assert_eq!(st.nlink(), 1);
    assert_eq!(st.uid(), unsafe { libc::getuid() });
}

#[test]
fn test_hardlink_shares_inode() {
    let dir = scratch_dir("link");
    let original = dir.join("a");
    let linked = dir.join("b");
    std::fs::write(&original, b"shared").unwrap();

    let (a, b) = drive(async {
        linkat(None, &original, None, &linked, 0)?.await?;
        let a = statx(None, &original, 0, libc::STATX_BASIC_STATS)?.await?;
        let b = statx(None, &linked, 0, libc::STATX_BASIC_STATS)?.await?;
        Ok((a, b))
    })
    .unwrap();

    assert_eq!(a.ino(), b.ino());
    assert_eq!(a.nlink(), 2);
    assert_eq!(b.nlink(), 2);

    drive(async { unlinkat(None, &linked, 0)?.await }).unwrap();
    let a = drive(async { statx(None, &original, 0, libc::STATX_BASIC_STATS)?.await }).unwrap();
    assert_eq!(a.nlink(), 1);
}

#[test]
fn test_renameat_moves_file() {
    let dir = scratch_dir("rename");
    std::fs::write(dir.join("old"), b"moved").unwrap();

    drive(async { renameat(None, dir.join("old"), None, dir.join("new"), 0)?.await }).unwrap();

    assert!(!dir.join("old").exists());
    assert_eq!(std::fs::read(dir.join("new")).unwrap(), b"moved");
}

#[test]
fn test_renameat_noreplace() {
    let dir = scratch_dir("noreplace");
    std::fs::write(dir.join("a"), b"a").unwrap();
    std::fs::write(dir.join("b"), b"b").unwrap();

    let res = drive(async {
        renameat(None, dir.join("a"), None, dir.join("b"), libc::RENAME_NOREPLACE)?.await
    });
    assert_eq!(res, Err(RtError::Os(libc::EEXIST)));
}

/// Descriptors in this process currently open on `path`.
fn fds_open_on(path: &std::path::Path) -> usize {
    std::fs::read_dir("/proc/self/fd")
        .unwrap()
        .filter_map(|entry| std::fs::read_link(entry.ok()?.path()).ok())
        .filter(|target| target == path)
        .count()
}

#[test]
fn test_opened_fd_survives_loop_destroy() {
    let dir = scratch_dir("destroy-open");
    std::fs::write(dir.join("kept"), b"x").unwrap();
    let path = std::fs::canonicalize(dir.join("kept")).unwrap();

    let lp = create_event_loop(&LoopPolicy::default()).unwrap();
    let mut kept = openat(None, path.as_path(), libc::O_RDONLY, 0).unwrap();
    let dropped = openat(None, path.as_path(), libc::O_RDONLY, 0).unwrap();
    while lp.inflight() > 0 {
        lp.turn(true).unwrap();
    }
    assert_eq!(fds_open_on(&path), 2);

    destroy_event_loop();
    assert_eq!(fds_open_on(&path), 2);

    let fd = kept.take_result().unwrap().unwrap();
    assert_eq!(std::fs::read_link(format!("/proc/self/fd/{}", fd)).unwrap(), path);
    drop(dropped);
    assert_eq!(fds_open_on(&path), 1);

    unsafe { libc::close(fd) };
    assert_eq!(fds_open_on(&path), 0);
}
