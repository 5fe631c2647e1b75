//! Operation handles: one per submitted request.
//!
//! An [`Operation`] owns the boxed request, and with it every buffer the
//! kernel reads or writes, until the completion for its tag arrives. It is
//! a `Future`, and the result can be taken exactly once: a second await (or
//! `take_result`) fails with `AlreadyConsumed`.
//!
//! ```ignore
//! let mut op = ringrt::ops::nop(7)?;
//! assert_eq!((&mut op).await?, 7);
//! assert!((&mut op).await.is_err());
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use io_uring::squeue;

use ringrt_core::error::{RtError, RtResult};
use ringrt_core::tag::Tag;

use crate::event_loop::{get_event_loop, EventLoop};

/// A kernel request that can be driven through the ring.
///
/// # Safety
///
/// `encode` may only point the SQE at memory owned by `self`. The request
/// is boxed before encoding and stays at that address until the completion
/// is drained, so such pointers stay valid for the kernel.
pub unsafe trait Request: 'static {
    type Output;

    /// Build the SQE. The loop stamps `user_data` afterwards.
    fn encode(&mut self) -> squeue::Entry;

    /// Turn the kernel result into the typed output.
    fn complete(self: Box<Self>, res: i32) -> RtResult<Self::Output>;

    /// Release whatever the kernel produced for an abandoned request.
    fn reap(self: Box<Self>, res: i32) {
        let _ = res;
    }
}

/// Type-erased request parked in the loop after its handle was dropped.
pub(crate) trait Orphan {
    fn discard(self: Box<Self>, res: i32);
}

impl<R: Request> Orphan for R {
    fn discard(self: Box<Self>, res: i32) {
        <R as Request>::reap(self, res)
    }
}

pub struct Operation<R: Request> {
    tag: Tag,
    lp: EventLoop,
    request: Option<Box<R>>,
    consumed: bool,
}

impl<R: Request> Operation<R> {
    /// Box `request` and enqueue it on the thread's active loop.
    pub fn submit(request: R) -> RtResult<Self> {
        Self::submit_on(get_event_loop()?, request)
    }

    /// `submit` on a loop the caller already resolved.
    pub(crate) fn submit_on(lp: EventLoop, request: R) -> RtResult<Self> {
        let mut request = Box::new(request);
        let entry = request.encode();
        // The box moves into the handle below without its heap contents moving.
        let tag = unsafe { lp.submit(entry)? };
        Ok(Operation {
            tag,
            lp,
            request: Some(request),
            consumed: false,
        })
    }

    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// The loop this operation was submitted to.
    pub fn event_loop(&self) -> &EventLoop {
        &self.lp
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed
    }

    /// Take the result without suspending.
    ///
    /// `None` while the kernel has not answered yet.
    pub fn take_result(&mut self) -> Option<RtResult<R::Output>> {
        if self.consumed {
            return Some(Err(RtError::AlreadyConsumed));
        }
        let res = self.lp.try_take(self.tag)?;
        Some(self.finish(res))
    }

    fn finish(&mut self, res: RtResult<i32>) -> RtResult<R::Output> {
        self.consumed = true;
        let request = self.request.take().ok_or(RtError::AlreadyConsumed)?;
        request.complete(res?)
    }
}

impl<R: Request> Future for Operation<R> {
    type Output = RtResult<R::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.consumed {
            return Poll::Ready(Err(RtError::AlreadyConsumed));
        }
        match this.lp.poll_slot(this.tag, cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(res) => Poll::Ready(this.finish(res)),
        }
    }
}

impl<R: Request> Drop for Operation<R> {
    fn drop(&mut self) {
        if let Some(request) = self.request.take() {
            self.lp.orphan(self.tag, request);
        }
    }
}

impl<R: Request> std::fmt::Debug for Operation<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("tag", &self.tag)
            .field("loop", &self.lp.id())
            .field("consumed", &self.consumed)
            .finish()
    }
}
