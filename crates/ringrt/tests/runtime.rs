mod common;

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use common::drive;
use ringrt::ops::nop;
use ringrt::{
    create_event_loop, destroy_event_loop, get_event_loop, run, yield_now, ArgError, ErrorKind,
    LoopPolicy, RtError, RtResult, RunConfig,
};

#[test]
fn test_queue_depths() {
    for (sq, cq) in [(1, 0), (2, 1), (2, 2), (5, 1), (16, 8), (100, 100), (256, 0)] {
        let lp = create_event_loop(&LoopPolicy::new().sq_entries(sq).cq_entries(cq))
            .unwrap_or_else(|e| panic!("sq={} cq={}: {}", sq, cq, e));
        let (got_sq, got_cq) = lp.queue_depths().unwrap();
        assert!(got_sq >= sq && got_cq >= cq, "sq={} cq={}", sq, cq);
        destroy_event_loop();
    }
}

#[test]
fn test_zero_sq_entries_fail() {
    for cq in [0, 1, 2, 100] {
        let err = create_event_loop(&LoopPolicy::new().sq_entries(0).cq_entries(cq)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Os);
    }
    assert_eq!(get_event_loop().unwrap_err(), RtError::NoActiveLoop);
}

#[test]
fn test_loop_lifecycle() {
    assert_eq!(get_event_loop().unwrap_err(), RtError::NoActiveLoop);
    destroy_event_loop();

    let created = create_event_loop(&LoopPolicy::default()).unwrap();
    let fetched = get_event_loop().unwrap();
    assert!(created.ptr_eq(&fetched));
    assert_eq!(created.id(), fetched.id());
    assert_eq!(create_event_loop(&LoopPolicy::default()).unwrap_err(), RtError::LoopActive);

    destroy_event_loop();
    assert_eq!(get_event_loop().unwrap_err(), RtError::NoActiveLoop);

    let next = create_event_loop(&LoopPolicy::default()).unwrap();
    assert_ne!(next.id(), created.id());
    destroy_event_loop();
}

#[test]
fn test_nop_echoes_i32_range() {
    let values = drive(async {
        let mut out = Vec::new();
        for v in [0, 1, -1, 42, i32::MIN, i32::MAX] {
            out.push(nop(v)?.await?);
        }
        out.push(nop(true)?.await?);
        out.push(nop(false)?.await?);
        out.push(nop(7u8)?.await?);
        out.push(nop(-5i64)?.await?);
        Ok(out)
    })
    .unwrap();
    assert_eq!(values, vec![0, 1, -1, 42, i32::MIN, i32::MAX, 1, 0, 7, -5]);
}

#[test]
fn test_nop_out_of_range() {
    for res in [
        drive(async { nop(i64::from(i32::MAX) + 1)?.await }),
        drive(async { nop(i64::from(i32::MIN) - 1)?.await }),
        drive(async { nop(u64::MAX)?.await }),
    ] {
        assert!(matches!(res, Err(RtError::Arg(ArgError::OutOfRange { name: "value", .. }))));
    }
}

#[test]
fn test_many_in_flight() {
    let sum = run(
        async {
            let ops = (0..200).map(nop).collect::<RtResult<Vec<_>>>()?;
            let mut sum = 0i64;
            for op in ops {
                sum += i64::from(op.await?);
            }
            Ok(sum)
        },
        &RunConfig::new().sq_entries(8),
    )
    .unwrap();
    assert_eq!(sum, (0..200).sum::<i64>());
}

#[test]
fn test_nested_run_rejected_at_depth() {
    async fn inner() -> RtResult<RtResult<i32>> {
        yield_now().await;
        Ok(drive(async { nop(1)?.await }))
    }

    let nested = drive(async {
        nop(0)?.await?;
        inner().await
    })
    .unwrap();
    assert_eq!(nested, Err(RtError::Reentrant));
}

struct PendingOnce {
    polled: bool,
}

impl Future for PendingOnce {
    type Output = RtResult<()>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<RtResult<()>> {
        if self.polled {
            return Poll::Ready(Ok(()));
        }
        self.polled = true;
        Poll::Pending
    }
}

#[test]
fn test_suspension_without_operation_rejected() {
    let res = drive(async {
        nop(1)?.await?;
        PendingOnce { polled: false }.await
    });
    assert_eq!(res, Err(RtError::InvalidSuspension));
    assert_eq!(get_event_loop().unwrap_err(), RtError::NoActiveLoop);
}

#[test]
fn test_error_from_coroutine_is_returned_unchanged() {
    let res: RtResult<()> = drive(async {
        nop(1)?.await?;
        Err(RtError::Os(libc::ENOSPC))
    });
    assert_eq!(res, Err(RtError::Os(libc::ENOSPC)));
}

#[test]
fn test_dropped_operation_does_not_block_run() {
    let v = drive(async {
        drop(nop(1)?);
        let kept = nop(2)?;
        drop(nop(3)?);
        kept.await
    })
    .unwrap();
    assert_eq!(v, 2);
}

#[test]
fn test_destroy_drains_and_keeps_results() {
    let lp = create_event_loop(&LoopPolicy::default()).unwrap();
    let mut pending = nop(5).unwrap();
    let orphan = nop(6).unwrap();
    drop(orphan);
    assert_eq!(lp.inflight(), 2);

    destroy_event_loop();
    assert_eq!(lp.inflight(), 0);
    assert!(lp.is_closed());
    assert_eq!(pending.take_result(), Some(Ok(5)));
    assert_eq!(pending.take_result(), Some(Err(RtError::AlreadyConsumed)));
    assert_eq!(nop(7).unwrap_err(), RtError::NoActiveLoop);
}

#[test]
fn test_run_reuses_active_loop() {
    let lp = create_event_loop(&LoopPolicy::default()).unwrap();
    let first = drive(async { Ok(get_event_loop()?.id()) }).unwrap();
    let second = drive(async { Ok(get_event_loop()?.id()) }).unwrap();
    assert_eq!(first, lp.id());
    assert_eq!(second, lp.id());
    assert!(get_event_loop().unwrap().ptr_eq(&lp));
    destroy_event_loop();
}

#[test]
fn test_run_builds_loop_from_config() {
    let depths = run(
        async { Ok(get_event_loop()?.queue_depths()) },
        &RunConfig::new().sq_entries(4).cq_entries(32),
    )
    .unwrap();
    assert_eq!(depths, Some((4, 32)));
    assert_eq!(get_event_loop().unwrap_err(), RtError::NoActiveLoop);
}

#[test]
fn test_loops_are_per_thread() {
    let here = create_event_loop(&LoopPolicy::default()).unwrap().id();
    let handles: Vec<_> = (0..4)
        .map(|i| {
            std::thread::spawn(move || {
                run(
                    async move {
                        let id = get_event_loop()?.id();
                        assert_eq!(nop(i)?.await?, i);
                        Ok(id)
                    },
                    &RunConfig::default(),
                )
                .unwrap()
            })
        })
        .collect();
    let mut ids: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    ids.push(here);
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 5);
    destroy_event_loop();
}
