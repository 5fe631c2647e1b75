//! Scheduler: drive one root future to completion on the current thread.
//!
//! Every time the root returns `Pending` the driver checks why. Either an
//! [`Operation`](crate::op::Operation) registered a waker on the loop, in
//! which case the ring is pumped until that operation completes, or the
//! root woke itself (a yield), in which case queued SQEs are flushed and
//! the root is polled again. Any other suspension is rejected.

use std::cell::Cell;
use std::future::Future;
use std::pin::{pin, Pin};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

use ringrt_core::config::RunConfig;
use ringrt_core::error::{RtError, RtResult};
use ringrt_core::ktrace;

use crate::event_loop::{create_event_loop, destroy_event_loop, get_event_loop, EventLoop};

thread_local! {
    static DRIVING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the thread as driving a root future for the guard's lifetime.
struct DriveGuard;

impl DriveGuard {
    fn enter() -> RtResult<Self> {
        if DRIVING.with(|driving| driving.replace(true)) {
            return Err(RtError::Reentrant);
        }
        Ok(DriveGuard)
    }
}

impl Drop for DriveGuard {
    fn drop(&mut self) {
        DRIVING.with(|driving| driving.set(false));
    }
}

/// Destroys a loop that `run` created, unless it was already replaced.
struct OwnedLoop(Option<EventLoop>);

impl Drop for OwnedLoop {
    fn drop(&mut self) {
        let Some(lp) = self.0.take() else {
            return;
        };
        if get_event_loop().is_ok_and(|active| active.ptr_eq(&lp)) {
            destroy_event_loop();
        }
    }
}

#[derive(Default)]
struct RootWaker {
    woken: AtomicBool,
}

impl RootWaker {
    fn take(&self) -> bool {
        self.woken.swap(false, Ordering::AcqRel)
    }
}

impl Wake for RootWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.woken.store(true, Ordering::Release);
    }
}

/// Run `fut` to completion and return its output.
///
/// Uses the thread's active loop, or builds one from `config` and tears it
/// down again on return. Errors from the future are returned unchanged.
///
/// # Errors
///
/// - `Reentrant` if this thread is already inside `run`
/// - `InvalidSuspension` if the future suspends on something other than an
///   operation or a self-wake
/// - `Stalled` if it waits while nothing is in flight
/// - loop construction and ring errors
pub fn run<F, T>(fut: F, config: &RunConfig) -> RtResult<T>
where
    F: Future<Output = RtResult<T>>,
{
    let _driving = DriveGuard::enter()?;
    let (lp, _owned) = match get_event_loop() {
        Ok(lp) => (lp, OwnedLoop(None)),
        Err(RtError::NoActiveLoop) => {
            let lp = create_event_loop(&config.policy())?;
            (lp.clone(), OwnedLoop(Some(lp)))
        }
        Err(e) => return Err(e),
    };

    let root = Arc::new(RootWaker::default());
    let waker = Waker::from(root.clone());
    let mut cx = Context::from_waker(&waker);
    let mut fut = pin!(fut);

    loop {
        lp.take_suspended();
        if let Poll::Ready(out) = fut.as_mut().poll(&mut cx) {
            return out;
        }
        let waiting = lp.take_suspended();

        if root.take() {
            // Yielded, or an operation completed during the poll.
            lp.turn(false)?;
            continue;
        }
        if !waiting {
            return Err(RtError::InvalidSuspension);
        }

        while !root.take() {
            if lp.inflight() == 0 {
                return Err(RtError::Stalled);
            }
            let n = lp.turn(true)?;
            ktrace!("loop {}: dispatched {} completions", lp.id(), n);
        }
    }
}

/// `run` with [`RunConfig::from_env`].
pub fn block_on<F, T>(fut: F) -> RtResult<T>
where
    F: Future<Output = RtResult<T>>,
{
    run(fut, &RunConfig::from_env())
}

/// Suspend once, letting queued submissions reach the kernel.
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

#[must_use = "futures do nothing unless awaited"]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
