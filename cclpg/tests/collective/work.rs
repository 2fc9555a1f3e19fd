use std::sync::Barrier;

use cclpg::{CclError, DataType, LocalFabric, OpType, ReduceOp, Tensor, WorkGroup};
use futures::future::try_join_all;

use super::helpers::{group, rerun_as_child, run_ranks};

#[test]
fn test_poll_does_not_block_before_peers_submit() {
    let sync = Barrier::new(2);
    run_ranks(2, |pg| {
        let t = Tensor::from_vec(vec![pg.rank() as i32 + 1]);
        if pg.rank() == 0 {
            let mut work = pg.all_reduce(std::slice::from_ref(&t), ReduceOp::Sum).unwrap();
            assert!(!work.poll().unwrap());
            assert!(matches!(
                work.is_success(),
                Err(CclError::WorkNotCompleted { .. })
            ));
            sync.wait();
            assert!(work.wait().unwrap());
            assert!(work.poll().unwrap());
            assert!(work.wait().unwrap());
        } else {
            sync.wait();
            pg.all_reduce(std::slice::from_ref(&t), ReduceOp::Sum)
                .unwrap()
                .wait()
                .unwrap();
        }
        assert_eq!(t.to_vec::<i32>().unwrap(), vec![3]);
    });
}

#[test]
fn test_abort_is_not_implemented() {
    run_ranks(2, |pg| {
        let t = Tensor::from_vec(vec![1.0f32]);
        let mut work = pg.broadcast(std::slice::from_ref(&t), 0).unwrap();
        assert!(matches!(
            work.abort(),
            Err(CclError::NotImplemented { .. })
        ));
        work.wait().unwrap();
        assert_eq!(work.op_type(), OpType::Broadcast);
    });
}

#[test]
fn test_work_group_waits_all() {
    run_ranks(3, |pg| {
        let a = Tensor::from_vec(vec![1i32]);
        let b = Tensor::from_vec(vec![pg.rank() as i32]);
        let mut group = WorkGroup::new();
        group.push(pg.all_reduce(std::slice::from_ref(&a), ReduceOp::Sum).unwrap());
        group.push(pg.broadcast(std::slice::from_ref(&b), 2).unwrap());
        group.push(pg.barrier().unwrap());
        group.wait_all().unwrap();
        assert_eq!(a.to_vec::<i32>().unwrap(), vec![3]);
        assert_eq!(b.to_vec::<i32>().unwrap(), vec![2]);
    });
}

#[test]
fn test_mismatched_collectives_surface_engine_error() {
    run_ranks(2, |pg| {
        let t = Tensor::from_vec(vec![5i64]);
        let outcome = if pg.rank() == 0 {
            pg.broadcast(std::slice::from_ref(&t), 0)
        } else {
            pg.all_reduce(std::slice::from_ref(&t), ReduceOp::Sum)
        }
        .and_then(|mut w| w.wait());
        let err = outcome.unwrap_err();
        assert!(err.is_engine(), "rank {}: {err}", pg.rank());
        assert!(err.to_string().starts_with("CCL error in: "));

        // The group stays usable.
        let u = Tensor::from_vec(vec![1i64]);
        pg.all_reduce(std::slice::from_ref(&u), ReduceOp::Sum)
            .unwrap()
            .wait()
            .unwrap();
        assert_eq!(u.to_vec::<i64>().unwrap(), vec![2]);
    });
}

#[tokio::test]
async fn test_await_chains_collectives() {
    let fabric = LocalFabric::new(2);
    let groups = [group(&fabric, 0), group(&fabric, 1)];
    let tensors: Vec<Tensor> = (0..2)
        .map(|r| Tensor::from_vec(vec![r as f64, 1.0]))
        .collect();

    let works = groups
        .iter()
        .zip(&tensors)
        .map(|(pg, t)| {
            pg.all_reduce(std::slice::from_ref(t), ReduceOp::Sum)
                .unwrap()
                .into_future()
        });
    let results = try_join_all(works).await.unwrap();
    for out in &results {
        assert_eq!(out[0].to_vec::<f64>().unwrap(), vec![1.0, 2.0]);
    }

    // Continue on the reduced buffers.
    let works = groups
        .iter()
        .zip(&results)
        .map(|(pg, out)| pg.all_reduce(&out[..], ReduceOp::Max).unwrap().into_future());
    try_join_all(works).await.unwrap();
    assert_eq!(tensors[1].to_vec::<f64>().unwrap(), vec![1.0, 2.0]);
}

#[test]
fn test_result_buffers_outlive_caller_handles() {
    run_ranks(2, |pg| {
        let mut work = {
            let t = if pg.rank() == 0 {
                Tensor::from_vec(vec![1i32, 2])
            } else {
                Tensor::zeros(&[2], DataType::I32)
            };
            pg.broadcast(std::slice::from_ref(&t), 0).unwrap()
        };
        work.wait().unwrap();
        assert_eq!(work.result().unwrap()[0].to_vec::<i32>().unwrap(), vec![1, 2]);
    });
}

const DROP_CHILD: &str = "CCLPG_TEST_DROP_PENDING";

#[test]
fn test_dropping_pending_work_terminates_process() {
    if std::env::var_os(DROP_CHILD).is_some() {
        // Rank 1 never submits, so the handle stays pending.
        let fabric = LocalFabric::new(2);
        let pg = group(&fabric, 0);
        let t = Tensor::from_vec(vec![1.0f32]);
        let work = pg.all_reduce(std::slice::from_ref(&t), ReduceOp::Sum).unwrap();
        drop(work);
        return;
    }

    let out = rerun_as_child(
        "collective::work::test_dropping_pending_work_terminates_process",
        DROP_CHILD,
    );
    assert!(!out.status.success());
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        assert_eq!(out.status.signal(), Some(6));
    }
}

#[test]
fn test_abandoned_pending_work_leaves_process_running() {
    let fabric = LocalFabric::new(2);
    let pg = group(&fabric, 0);
    let t = Tensor::from_vec(vec![1.0f32]);
    let work = pg.all_reduce(std::slice::from_ref(&t), ReduceOp::Sum).unwrap();
    assert!(!work.is_success().is_ok_and(|ok| ok));
    unsafe { work.abandon() };
    assert_eq!(fabric.pending_collectives().unwrap(), 1);
}
