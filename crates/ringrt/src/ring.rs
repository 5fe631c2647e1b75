//! `RingTransport` - the io_uring SQ/CQ pair behind one event loop.
//!
//! Enqueue pushes an SQE without entering the kernel. `flush()` and
//! `submit_and_drain()` are the only calls that reach `io_uring_enter()`.
//! No SQPOLL, no fixed files, no fixed buffers.

use io_uring::{squeue, IoUring};

use ringrt_core::config::LoopPolicy;
use ringrt_core::error::{RtError, RtResult};
use ringrt_core::tag::Tag;
use ringrt_core::{kdebug, ktrace};

/// One drained CQE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingCompletion {
    pub tag: Tag,
    /// Kernel result: non-negative on success, `-errno` on failure.
    pub result: i32,
}

pub struct RingTransport {
    ring: IoUring,
    /// SQEs handed to the kernel whose CQE has not been drained yet.
    inflight: usize,
    /// SQEs pushed but not yet submitted.
    pending_submit: usize,
}

/// CQ depth requested for an explicit `cq_entries`.
///
/// The kernel rejects a CQ smaller than the (rounded) SQ, so the larger of
/// the two wins, rounded up to a power of two.
pub(crate) fn cq_depth(sq_entries: u32, cq_entries: u32) -> u32 {
    const CAP: u32 = 1 << 31;
    let sq = sq_entries.checked_next_power_of_two().unwrap_or(CAP);
    sq.max(cq_entries).checked_next_power_of_two().unwrap_or(CAP)
}

impl RingTransport {
    pub fn new(policy: &LoopPolicy) -> RtResult<Self> {
        let mut builder = IoUring::builder();
        builder.setup_clamp();
        if policy.cq_entries != 0 {
            builder.setup_cqsize(cq_depth(policy.sq_entries, policy.cq_entries));
        }

        let ring = builder.build(policy.sq_entries).map_err(|e| {
            kdebug!(
                "ring setup failed: sq={} cq={}: {}",
                policy.sq_entries,
                policy.cq_entries,
                e
            );
            RtError::from(e)
        })?;

        kdebug!(
            "ring ready: requested sq={} cq={}, got sq={} cq={}",
            policy.sq_entries,
            policy.cq_entries,
            ring.params().sq_entries(),
            ring.params().cq_entries()
        );

        Ok(Self {
            ring,
            inflight: 0,
            pending_submit: 0,
        })
    }

    /// Push a tagged SQE. Nothing is submitted until the next flush.
    ///
    /// # Safety
    ///
    /// Every buffer the entry points at must stay valid and unmoved until
    /// the matching completion has been drained.
    pub unsafe fn enqueue(&mut self, entry: &squeue::Entry) -> RtResult<()> {
        self.ring
            .submission()
            .push(entry)
            .map_err(|_| RtError::RingFull)?;
        self.pending_submit += 1;
        Ok(())
    }

    /// Submit queued SQEs without waiting for completions.
    pub fn flush(&mut self) -> RtResult<usize> {
        if self.pending_submit == 0 {
            return Ok(0);
        }
        self.enter(0)
    }

    /// Flush, optionally wait for one CQE, then drain every available CQE.
    ///
    /// Completions come back in kernel delivery order. A blocking call with
    /// nothing queued or in flight returns immediately instead of hanging.
    pub fn submit_and_drain(&mut self, block: bool) -> RtResult<Vec<RingCompletion>> {
        let outstanding = self.inflight + self.pending_submit;
        let want = if block && outstanding > 0 && self.ring.completion().is_empty() {
            1
        } else {
            0
        };
        if want > 0 || self.pending_submit > 0 {
            self.enter(want)?;
        }

        let mut out = Vec::new();
        for cqe in self.ring.completion() {
            out.push(RingCompletion {
                tag: Tag::from_user_data(cqe.user_data()),
                result: cqe.result(),
            });
        }
        self.inflight = self.inflight.saturating_sub(out.len());
        Ok(out)
    }

    fn enter(&mut self, want: usize) -> RtResult<usize> {
        match self.ring.submit_and_wait(want) {
            Ok(submitted) => {
                self.inflight += submitted;
                self.pending_submit = self.pending_submit.saturating_sub(submitted);
                Ok(submitted)
            }
            // Interrupted or CQ backpressure: whatever is in the CQ gets drained.
            Err(e) if matches!(e.raw_os_error(), Some(libc::EINTR) | Some(libc::EBUSY)) => {
                ktrace!("io_uring_enter: {}", e);
                Ok(0)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn sq_entries(&self) -> u32 {
        self.ring.params().sq_entries()
    }

    pub fn cq_entries(&self) -> u32 {
        self.ring.params().cq_entries()
    }

    pub fn inflight(&self) -> usize {
        self.inflight
    }

    pub fn pending_submit(&self) -> usize {
        self.pending_submit
    }
}
