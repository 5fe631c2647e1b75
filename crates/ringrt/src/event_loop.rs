//! Per-thread event loop
//!
//! An [`EventLoop`] owns one [`RingTransport`] and the correlation table
//! that maps a completion's tag back to the operation waiting for it.
//!
//! Each thread has at most one active loop, held in a thread-local
//! registry. The handle is `Rc`-based, so a loop can never be used from a
//! thread other than the one that created it.
//!
//! ```text
//!  Operation::submit ──► OpTable::insert ──► RingTransport::enqueue
//!                                                   │
//!  Operation::poll ◄── waker ◄── OpTable::complete ◄┴── turn() drains CQ
//! ```

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll, Waker};

use io_uring::squeue;

use ringrt_core::config::LoopPolicy;
use ringrt_core::error::{RtError, RtResult};
use ringrt_core::tag::Tag;
use ringrt_core::{kdebug, ktrace, kwarn};

use crate::op::Orphan;
use crate::ring::{RingCompletion, RingTransport};

static NEXT_LOOP_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static ACTIVE: RefCell<Option<EventLoop>> = const { RefCell::new(None) };
}

/// Where an in-flight request stands.
pub(crate) enum SlotState {
    /// Enqueued; nobody has polled it yet.
    Submitted,
    /// Polled before completion.
    Waiting(Waker),
    /// Result arrived and is waiting to be consumed.
    Completed(i32),
    /// Handle dropped while in flight; buffers kept until the CQE arrives.
    Orphaned(Box<dyn Orphan>),
}

struct Slot {
    generation: u32,
    state: Option<SlotState>,
}

/// What `OpTable::complete` did with a CQE.
pub(crate) enum Dispatch {
    Wake(Waker),
    Stored,
    Reaped,
    Unknown,
}

/// Generation-tagged arena of in-flight requests.
pub(crate) struct OpTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
    next_generation: u32,
    /// Slots still waiting on the kernel.
    inflight: usize,
}

impl SlotState {
    fn is_pending(&self) -> bool {
        !matches!(self, SlotState::Completed(_))
    }
}

impl OpTable {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            next_generation: 1,
            inflight: 0,
        }
    }

    pub(crate) fn insert(&mut self) -> Tag {
        let generation = self.next_generation;
        self.next_generation = self.next_generation.wrapping_add(1);
        self.inflight += 1;

        let index = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.generation = generation;
                slot.state = Some(SlotState::Submitted);
                index
            }
            None => {
                self.slots.push(Slot {
                    generation,
                    state: Some(SlotState::Submitted),
                });
                (self.slots.len() - 1) as u32
            }
        };
        Tag::new(index, generation)
    }

    pub(crate) fn get_mut(&mut self, tag: Tag) -> Option<&mut SlotState> {
        self.slots
            .get_mut(tag.index() as usize)
            .filter(|slot| slot.generation == tag.generation())
            .and_then(|slot| slot.state.as_mut())
    }

    pub(crate) fn remove(&mut self, tag: Tag) -> Option<SlotState> {
        let slot = self
            .slots
            .get_mut(tag.index() as usize)
            .filter(|slot| slot.generation == tag.generation())?;
        let state = slot.state.take()?;
        self.free.push(tag.index());
        if state.is_pending() {
            self.inflight -= 1;
        }
        Some(state)
    }

    /// Record a kernel result for `tag`.
    pub(crate) fn complete(&mut self, tag: Tag, res: i32) -> Dispatch {
        match self.get_mut(tag) {
            None | Some(SlotState::Completed(_)) => return Dispatch::Unknown,
            Some(SlotState::Orphaned(_)) => {}
            Some(state) => {
                let prev = std::mem::replace(state, SlotState::Completed(res));
                self.inflight -= 1;
                return match prev {
                    SlotState::Waiting(waker) => Dispatch::Wake(waker),
                    _ => Dispatch::Stored,
                };
            }
        }
        if let Some(SlotState::Orphaned(request)) = self.remove(tag) {
            request.discard(res);
        }
        Dispatch::Reaped
    }

    /// Requests whose completion has not been drained yet.
    pub(crate) fn inflight(&self) -> usize {
        self.inflight
    }

    /// Drop every slot the kernel never answered, keeping completed results
    /// for handles that are still alive.
    pub(crate) fn abandon_pending(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.state.as_ref().is_some_and(SlotState::is_pending) {
                slot.state = None;
                self.free.push(index as u32);
            }
        }
        self.inflight = 0;
    }
}

struct LoopInner {
    id: u64,
    ring: RefCell<Option<RingTransport>>,
    table: RefCell<OpTable>,
    /// Set when an operation registers a waker; read by the scheduler.
    suspended: Cell<bool>,
}

impl LoopInner {
    /// Wait out every in-flight request, then release the ring.
    ///
    /// Completed results stay in the table until their handles take or drop
    /// them.
    fn shutdown(&self) {
        let Some(mut ring) = self.ring.borrow_mut().take() else {
            return;
        };
        let mut table = self.table.borrow_mut();
        while table.inflight() > 0 {
            let done = match ring.submit_and_drain(true) {
                Ok(done) => done,
                Err(e) => {
                    kwarn!("loop {}: drain aborted with {} in flight: {}", self.id, table.inflight(), e);
                    break;
                }
            };
            if done.is_empty() && ring.inflight() == 0 && ring.pending_submit() == 0 {
                kwarn!("loop {}: {} requests never reached the kernel", self.id, table.inflight());
                break;
            }
            for c in done {
                let _ = table.complete(c.tag, c.result);
            }
        }
        table.abandon_pending();
        kdebug!("loop {}: ring released", self.id);
    }
}

impl Drop for LoopInner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Handle to a thread's event loop. Cheap to clone.
#[derive(Clone)]
pub struct EventLoop {
    inner: Rc<LoopInner>,
}

impl EventLoop {
    fn new(ring: RingTransport) -> Self {
        Self {
            inner: Rc::new(LoopInner {
                id: NEXT_LOOP_ID.fetch_add(1, Ordering::Relaxed),
                ring: RefCell::new(Some(ring)),
                table: RefCell::new(OpTable::new()),
                suspended: Cell::new(false),
            }),
        }
    }

    /// Process-unique identifier.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn ptr_eq(&self, other: &EventLoop) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Requests submitted whose completion has not arrived yet.
    pub fn inflight(&self) -> usize {
        self.inner.table.borrow().inflight()
    }

    /// True once the loop has been destroyed.
    pub fn is_closed(&self) -> bool {
        self.inner.ring.borrow().is_none()
    }

    /// `(sq_entries, cq_entries)` granted by the kernel.
    pub fn queue_depths(&self) -> Option<(u32, u32)> {
        self.inner
            .ring
            .borrow()
            .as_ref()
            .map(|ring| (ring.sq_entries(), ring.cq_entries()))
    }

    /// Allocate a tag and enqueue `entry` under it.
    ///
    /// A full SQ is flushed to the kernel, and the CQ reaped to relieve
    /// backpressure, before the push is retried.
    ///
    /// # Safety
    ///
    /// See [`RingTransport::enqueue`].
    pub(crate) unsafe fn submit(&self, entry: squeue::Entry) -> RtResult<Tag> {
        const RETRIES: usize = 3;

        let mut guard = self.inner.ring.borrow_mut();
        let ring = guard.as_mut().ok_or(RtError::LoopClosed)?;
        let tag = self.inner.table.borrow_mut().insert();
        let entry = entry.user_data(tag.to_user_data());

        let mut attempt = 0;
        let pushed = loop {
            match ring.enqueue(&entry) {
                Err(RtError::RingFull) if attempt < RETRIES => {
                    attempt += 1;
                    match ring.submit_and_drain(false) {
                        Ok(done) => self.dispatch(&done),
                        Err(e) => break Err(e),
                    }
                }
                other => break other,
            }
        };
        if let Err(e) = pushed {
            self.inner.table.borrow_mut().remove(tag);
            return Err(e);
        }
        ktrace!("loop {}: submitted {}", self.inner.id, tag);
        Ok(tag)
    }

    /// Consume the result for `tag`, or register `cx`'s waker.
    pub(crate) fn poll_slot(&self, tag: Tag, cx: &mut Context<'_>) -> Poll<RtResult<i32>> {
        if let Some(res) = self.take_completed(tag) {
            return Poll::Ready(Ok(res));
        }
        if self.is_closed() {
            return Poll::Ready(Err(RtError::LoopClosed));
        }
        let mut table = self.inner.table.borrow_mut();
        match table.get_mut(tag) {
            None | Some(SlotState::Completed(_)) => Poll::Ready(Err(RtError::LoopClosed)),
            Some(state) => {
                *state = SlotState::Waiting(cx.waker().clone());
                self.inner.suspended.set(true);
                Poll::Pending
            }
        }
    }

    /// Non-suspending variant of `poll_slot`.
    pub(crate) fn try_take(&self, tag: Tag) -> Option<RtResult<i32>> {
        if let Some(res) = self.take_completed(tag) {
            return Some(Ok(res));
        }
        if self.is_closed() {
            return Some(Err(RtError::LoopClosed));
        }
        match self.inner.table.borrow_mut().get_mut(tag) {
            None => Some(Err(RtError::LoopClosed)),
            Some(_) => None,
        }
    }

    /// Remove and return the result for `tag` if it has arrived.
    fn take_completed(&self, tag: Tag) -> Option<i32> {
        let mut table = self.inner.table.borrow_mut();
        match table.get_mut(tag) {
            Some(SlotState::Completed(res)) => {
                let res = *res;
                table.remove(tag);
                Some(res)
            }
            _ => None,
        }
    }

    /// Take over the buffers of a handle dropped before consumption.
    pub(crate) fn orphan(&self, tag: Tag, request: Box<dyn Orphan>) {
        let mut table = self.inner.table.borrow_mut();
        match table.get_mut(tag) {
            Some(SlotState::Completed(res)) => {
                let res = *res;
                table.remove(tag);
                drop(table);
                request.discard(res);
            }
            Some(state) => *state = SlotState::Orphaned(request),
            // Loop already drained; the kernel is done with the buffers.
            None => {}
        }
    }

    /// Clear and return the suspension marker.
    pub(crate) fn take_suspended(&self) -> bool {
        self.inner.suspended.replace(false)
    }

    /// One submit/drain/dispatch cycle. Returns the number of CQEs handled.
    ///
    /// With `block`, waits for at least one completion if any request is
    /// outstanding.
    pub fn turn(&self, block: bool) -> RtResult<usize> {
        let done: Vec<RingCompletion> = {
            let mut ring = self.inner.ring.borrow_mut();
            match ring.as_mut() {
                Some(ring) => ring.submit_and_drain(block)?,
                None => return Ok(0),
            }
        };

        self.dispatch(&done);
        Ok(done.len())
    }

    /// Hand drained completions to their slots, waking waiters.
    fn dispatch(&self, done: &[RingCompletion]) {
        let mut wake = Vec::new();
        {
            let mut table = self.inner.table.borrow_mut();
            for c in done {
                match table.complete(c.tag, c.result) {
                    Dispatch::Wake(waker) => wake.push(waker),
                    Dispatch::Stored | Dispatch::Reaped => {}
                    Dispatch::Unknown => {
                        kwarn!("loop {}: completion for unknown tag {} ({})", self.inner.id, c.tag, c.result);
                    }
                }
            }
        }
        for waker in wake {
            waker.wake();
        }
    }

    fn close(&self) {
        self.inner.shutdown();
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("id", &self.inner.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Create the calling thread's event loop.
///
/// Fails with `LoopActive` if the thread already has one.
pub fn create_event_loop(policy: &LoopPolicy) -> RtResult<EventLoop> {
    if ACTIVE.with(|active| active.borrow().is_some()) {
        return Err(RtError::LoopActive);
    }
    let lp = EventLoop::new(RingTransport::new(policy)?);
    ACTIVE.with(|active| *active.borrow_mut() = Some(lp.clone()));
    kdebug!("loop {}: created (sq={} cq={})", lp.id(), policy.sq_entries, policy.cq_entries);
    Ok(lp)
}

/// The calling thread's active loop.
pub fn get_event_loop() -> RtResult<EventLoop> {
    ACTIVE.with(|active| active.borrow().clone().ok_or(RtError::NoActiveLoop))
}

/// Tear down the calling thread's loop. No-op without one.
///
/// In-flight requests are waited for before the ring is released. Handles
/// that outlive the loop still hand back a result that arrived; anything
/// the kernel never answered reports `LoopClosed`.
pub fn destroy_event_loop() {
    let Some(lp) = ACTIVE.with(|active| active.borrow_mut().take()) else {
        return;
    };
    kdebug!("loop {}: destroying with {} in flight", lp.id(), lp.inflight());
    lp.close();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_reuses_slots_with_new_generation() {
        let mut table = OpTable::new();
        let a = table.insert();
        assert!(matches!(table.remove(a), Some(SlotState::Submitted)));

        let b = table.insert();
        assert_eq!(a.index(), b.index());
        assert_ne!(a.generation(), b.generation());
        assert!(table.get_mut(a).is_none());
        assert!(matches!(table.complete(a, 0), Dispatch::Unknown));
        assert!(matches!(table.complete(b, 5), Dispatch::Stored));
        assert!(matches!(table.get_mut(b), Some(SlotState::Completed(5))));
    }

    #[test]
    fn test_table_counts() {
        let mut table = OpTable::new();
        let a = table.insert();
        let _b = table.insert();
        assert_eq!(table.inflight(), 2);
        let _ = table.complete(a, 0);
        assert_eq!(table.inflight(), 1);
        assert!(matches!(table.remove(a), Some(SlotState::Completed(0))));
        assert!(table.remove(a).is_none());
        assert_eq!(table.inflight(), 1);
    }

    struct Noted(std::rc::Rc<Cell<i32>>);

    impl Orphan for Noted {
        fn discard(self: Box<Self>, res: i32) {
            self.0.set(res);
        }
    }

    #[test]
    fn test_table_inflight_counter() {
        let mut table = OpTable::new();
        let tags: Vec<Tag> = (0..4).map(|_| table.insert()).collect();
        assert_eq!(table.inflight(), 4);

        // Submission failure path.
        table.remove(tags[0]);
        assert_eq!(table.inflight(), 3);

        let seen = std::rc::Rc::new(Cell::new(0));
        if let Some(state) = table.get_mut(tags[1]) {
            *state = SlotState::Orphaned(Box::new(Noted(seen.clone())));
        }
        assert!(matches!(table.complete(tags[1], 11), Dispatch::Reaped));
        assert_eq!(seen.get(), 11);
        assert_eq!(table.inflight(), 2);

        assert!(matches!(table.complete(tags[2], 0), Dispatch::Stored));
        assert!(matches!(table.complete(tags[2], 0), Dispatch::Unknown));
        assert_eq!(table.inflight(), 1);

        table.abandon_pending();
        assert_eq!(table.inflight(), 0);
        assert!(table.get_mut(tags[3]).is_none());
        assert!(matches!(table.get_mut(tags[2]), Some(SlotState::Completed(0))));
    }

    #[test]
    fn test_registry_lifecycle() {
        assert_eq!(get_event_loop().unwrap_err(), RtError::NoActiveLoop);
        destroy_event_loop();

        let lp = create_event_loop(&LoopPolicy::default()).unwrap();
        let again = get_event_loop().unwrap();
        assert!(lp.ptr_eq(&again));
        assert_eq!(lp.id(), again.id());
        assert_eq!(create_event_loop(&LoopPolicy::default()).unwrap_err(), RtError::LoopActive);

        destroy_event_loop();
        assert!(lp.is_closed());
        assert_eq!(get_event_loop().unwrap_err(), RtError::NoActiveLoop);
    }

    #[test]
    fn test_failed_create_leaves_no_loop() {
        let err = create_event_loop(&LoopPolicy::new().sq_entries(0)).unwrap_err();
        assert_eq!(err, RtError::Os(libc::EINVAL));
        assert_eq!(get_event_loop().unwrap_err(), RtError::NoActiveLoop);
    }

    #[test]
    fn test_loops_on_threads_are_distinct() {
        let here = create_event_loop(&LoopPolicy::default()).unwrap().id();
        let there = std::thread::spawn(|| {
            let id = create_event_loop(&LoopPolicy::default()).unwrap().id();
            destroy_event_loop();
            id
        })
        .join()
        .unwrap();
        assert_ne!(here, there);
        destroy_event_loop();
    }
}
