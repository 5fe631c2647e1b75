//! ringrt End-to-End Smoke Test
//!
//! Drives every operation through a real kernel ring:
//!   Part A - Loop lifecycle and queue-depth negotiation
//!   Part B - File I/O: openat, write, read, fsync, statx, close
//!   Part C - Directories: mkdirat, symlinkat, linkat, renameat, unlinkat
//!   Part D - Sockets: TCP loopback echo, socket options
//!   Part E - Scheduler protocol: consumption, nesting, bad suspension
//!
//! Run: ./target/release/ringrt-smoke
//! Set RINGRT_LOG_LEVEL=debug to see ring setup and teardown.

use std::future::Future;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};

use ringrt::ops;
use ringrt::{
    create_event_loop, destroy_event_loop, get_event_loop, run, LoopPolicy, RtError, RtResult,
    RunConfig,
};
use ringrt_core::kinfo;

// ── Test harness ──

struct TestRunner {
    total: usize,
    passed: usize,
    failed: usize,
    config: RunConfig,
}

const LINE: &str = "────────────────────────────────────────────────────────────";

impl TestRunner {
    fn new(config: RunConfig) -> Self {
        Self { total: 0, passed: 0, failed: 0, config }
    }

    fn section(&self, name: &str) {
        println!("\n{}", LINE);
        println!("  {}", name);
        println!("{}", LINE);
    }

    fn pass(&mut self, name: &str) {
        self.total += 1;
        self.passed += 1;
        println!("  [{:2}] {:<52} PASS", self.total, name);
    }

    fn fail(&mut self, name: &str, reason: &str) {
        self.total += 1;
        self.failed += 1;
        println!("  [{:2}] {:<52} FAIL: {}", self.total, name, reason);
    }

    fn check(&mut self, name: &str, ok: bool, reason: &str) {
        if ok { self.pass(name); } else { self.fail(name, reason); }
    }

    /// Drive `fut` and record PASS when it returns `Ok(true)`.
    fn drive<F>(&mut self, name: &str, fut: F)
    where
        F: Future<Output = RtResult<bool>>,
    {
        match run(fut, &self.config) {
            Ok(true) => self.pass(name),
            Ok(false) => self.fail(name, "unexpected result"),
            Err(e) => self.fail(name, &e.to_string()),
        }
    }

    fn summary(&self) {
        println!("\n{}", LINE);
        println!(
            "  Total: {}  Passed: {}  Failed: {}",
            self.total, self.passed, self.failed
        );
        println!("{}", LINE);
    }
}

fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ringrt-smoke-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    let _ = std::fs::create_dir_all(&dir);
    dir
}

// ════════════════════════════════════════════════════════════
// Part A: Lifecycle
// ════════════════════════════════════════════════════════════

fn test_lifecycle(t: &mut TestRunner) {
    t.section("Part A: Loop lifecycle");

    t.check(
        "no loop before create",
        matches!(get_event_loop(), Err(RtError::NoActiveLoop)),
        "a loop was already active",
    );

    for (sq, cq) in [(1, 0), (2, 1), (5, 1), (16, 8), (100, 100), (256, 0)] {
        let name = format!("ring sq={} cq={}", sq, cq);
        match create_event_loop(&LoopPolicy::new().sq_entries(sq).cq_entries(cq)) {
            Ok(lp) => {
                let depths = lp.queue_depths().unwrap_or((0, 0));
                destroy_event_loop();
                t.check(&name, depths.0 >= sq && depths.1 >= cq, &format!("got {:?}", depths));
            }
            Err(e) => t.fail(&name, &e.to_string()),
        }
    }

    match create_event_loop(&LoopPolicy::new().sq_entries(0)) {
        Err(RtError::Os(errno)) => t.check("ring sq=0 rejected", errno == libc::EINVAL, "wrong errno"),
        Err(e) => t.fail("ring sq=0 rejected", &e.to_string()),
        Ok(_) => {
            destroy_event_loop();
            t.fail("ring sq=0 rejected", "ring was built");
        }
    }

    let same = create_event_loop(&LoopPolicy::default())
        .and_then(|lp| Ok(lp.ptr_eq(&get_event_loop()?)));
    t.check("get returns created loop", same == Ok(true), "different loop");
    t.check(
        "second create rejected",
        create_event_loop(&LoopPolicy::default()).err() == Some(RtError::LoopActive),
        "second loop created",
    );
    destroy_event_loop();
    t.check(
        "destroy clears registry",
        matches!(get_event_loop(), Err(RtError::NoActiveLoop)),
        "loop still active",
    );
}

// ════════════════════════════════════════════════════════════
// Part B: File I/O
// ════════════════════════════════════════════════════════════

fn test_files(t: &mut TestRunner, dir: &std::path::Path) {
    t.section("Part B: File I/O");
    let path = dir.join("file.bin");

    t.drive("openat/write/fsync/read/close", async {
        let fd = ops::openat(None, &path, libc::O_RDWR | libc::O_CREAT | libc::O_TRUNC, 0o644)?.await?;
        let n = ops::write(fd, b"ring smoke", 0)?.await?;
        ops::fsync(fd, 0)?.await?;
        let back = ops::read(fd, 64, 0)?.await?;
        ops::close(fd)?.await?;
        Ok(n == 10 && back == b"ring smoke")
    });

    t.drive("statx size", async {
        let st = ops::statx(None, &path, 0, libc::STATX_BASIC_STATS)?.await?;
        Ok(st.is_file() && st.size() == 10)
    });

    t.drive("read bad fd -> EBADF", async {
        Ok(ops::read(-1, 1, 0)?.await == Err(RtError::Os(libc::EBADF)))
    });

    t.drive("nop echo", async {
        Ok(ops::nop(-7)?.await? == -7 && ops::nop(true)?.await? == 1)
    });
}

// ════════════════════════════════════════════════════════════
// Part C: Directories
// ════════════════════════════════════════════════════════════

fn test_dirs(t: &mut TestRunner, dir: &std::path::Path) {
    t.section("Part C: Directories");
    let sub = dir.join("sub");
    let file = dir.join("file.bin");
    let hard = dir.join("hard");
    let moved = dir.join("moved");
    let soft = dir.join("soft");

    t.drive("mkdirat + statx", async {
        ops::mkdirat(None, &sub, 0o755)?.await?;
        Ok(ops::statx(None, &sub, 0, libc::STATX_TYPE)?.await?.is_dir())
    });

    t.drive("linkat shares inode", async {
        ops::linkat(None, &file, None, &hard, 0)?.await?;
        let a = ops::statx(None, &file, 0, libc::STATX_BASIC_STATS)?.await?;
        let b = ops::statx(None, &hard, 0, libc::STATX_BASIC_STATS)?.await?;
        Ok(a.ino() == b.ino() && b.nlink() == 2)
    });

    t.drive("renameat", async {
        ops::renameat(None, &hard, None, &moved, 0)?.await?;
        let gone = ops::statx(None, &hard, 0, 0)?.await;
        Ok(matches!(gone, Err(RtError::Os(libc::ENOENT))))
    });

    t.drive("symlinkat", async {
        ops::symlinkat(&file, None, &soft)?.await?;
        let st = ops::statx(None, &soft, libc::AT_SYMLINK_NOFOLLOW, libc::STATX_TYPE)?.await?;
        Ok(st.is_symlink())
    });

    t.drive("unlinkat files and dir", async {
        ops::unlinkat(None, &soft, 0)?.await?;
        ops::unlinkat(None, &moved, 0)?.await?;
        ops::unlinkat(None, &sub, libc::AT_REMOVEDIR)?.await?;
        Ok(true)
    });
}

// ════════════════════════════════════════════════════════════
// Part D: Sockets
// ════════════════════════════════════════════════════════════

fn bound_port(fd: i32) -> u16 {
    let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
    unsafe { libc::getsockname(fd, &mut addr as *mut _ as *mut libc::sockaddr, &mut len) };
    u16::from_be(addr.sin_port)
}

fn test_sockets(t: &mut TestRunner) {
    t.section("Part D: Sockets");

    t.drive("tcp loopback echo", async {
        let listener = ops::socket(libc::AF_INET, libc::SOCK_STREAM, 0)?.await?;
        ops::setsockopt(listener, libc::SOL_SOCKET, libc::SO_REUSEADDR, 1)?.await?;
        ops::bind(listener, SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))?.await?;
        ops::listen(listener, 8)?.await?;
        let port = bound_port(listener);

        let client = ops::socket(libc::AF_INET, libc::SOCK_STREAM, 0)?.await?;
        let accepting = ops::accept(listener, 0)?;
        ops::connect(client, SocketAddrV4::new(Ipv4Addr::LOCALHOST, port))?.await?;
        let (server, peer) = accepting.await?;

        ops::send(client, b"echo", 0)?.await?;
        let got = ops::recv(server, 16, 0)?.await?;
        ops::send(server, &got, 0)?.await?;
        let back = ops::recv(client, 16, 0)?.await?;

        for fd in [client, server, listener] {
            ops::close(fd)?.await?;
        }
        Ok(back == b"echo" && peer.is_some())
    });

    t.drive("sockopt int + raw", async {
        let fd = ops::socket(libc::AF_INET, libc::SOCK_STREAM, 0)?.await?;
        ops::setsockopt(fd, libc::SOL_SOCKET, libc::SO_KEEPALIVE, true)?.await?;
        let int = ops::getsockopt(fd, libc::SOL_SOCKET, libc::SO_KEEPALIVE)?.await?;
        let raw = ops::getsockopt_raw(fd, libc::SOL_SOCKET, libc::SO_KEEPALIVE, 4)?.await?;
        ops::close(fd)?.await?;
        Ok(int == 1 && raw == 1i32.to_ne_bytes())
    });
}

// ════════════════════════════════════════════════════════════
// Part E: Scheduler protocol
// ════════════════════════════════════════════════════════════

struct Stuck;

impl Future for Stuck {
    type Output = RtResult<bool>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<RtResult<bool>> {
        Poll::Pending
    }
}

fn test_protocol(t: &mut TestRunner) {
    t.section("Part E: Scheduler protocol");

    t.drive("second await -> AlreadyConsumed", async {
        let mut op = ops::nop(3)?;
        let first = (&mut op).await?;
        Ok(first == 3 && (&mut op).await == Err(RtError::AlreadyConsumed))
    });

    let config = t.config;
    t.drive("nested run -> Reentrant", async move {
        Ok(run(async { Ok(()) }, &config) == Err(RtError::Reentrant))
    });

    let res = run(Stuck, &t.config);
    t.check(
        "foreign suspension -> InvalidSuspension",
        res == Err(RtError::InvalidSuspension),
        &format!("{:?}", res),
    );

    t.drive("many operations in flight", async {
        let pending = (0..128).map(ops::nop).collect::<RtResult<Vec<_>>>()?;
        let mut ok = true;
        for (i, op) in pending.into_iter().enumerate() {
            ok &= op.await? == i as i32;
        }
        Ok(ok)
    });
}

fn main() {
    println!("=== ringrt End-to-End Smoke Test ===");
    let kver = std::fs::read_to_string("/proc/version").unwrap_or_default();
    println!("    kernel: {}", kver.trim().split(' ').nth(2).unwrap_or("?"));

    let config = RunConfig::from_env();
    kinfo!("smoke: sq={} cq={}", config.sq_entries, config.cq_entries);
    let mut t = TestRunner::new(config);
    let dir = scratch_dir();

    test_lifecycle(&mut t);
    test_files(&mut t, &dir);
    test_dirs(&mut t, &dir);
    test_sockets(&mut t);
    test_protocol(&mut t);

    let _ = std::fs::remove_dir_all(&dir);
    t.summary();
    std::process::exit(if t.failed > 0 { 1 } else { 0 });
}
