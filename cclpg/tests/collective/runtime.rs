use std::sync::Arc;
use std::time::Duration;

use cclpg::{
    CclError, EngineRuntime, HashStore, LocalFabric, ProcessGroup, ProcessGroupOptions, ReduceOp,
    Store, Tensor,
};

use super::helpers::{rerun_as_child, run_ranks};

#[test]
fn test_global_runtime_accessor() {
    let fabric = LocalFabric::new(1);
    let env = Arc::new(fabric.environment(0).unwrap());
    let rt = EngineRuntime::install_global(env.clone()).unwrap();
    assert!(matches!(
        EngineRuntime::install_global(env),
        Err(CclError::Runtime { .. })
    ));
    assert!(Arc::ptr_eq(&rt, &EngineRuntime::global().unwrap()));

    let store: Arc<dyn Store> = Arc::new(HashStore::new());
    let opts = ProcessGroupOptions::from_raw(-1, -1, Duration::from_secs(60));
    let pg = ProcessGroup::from_global(opts.clone(), Some(store)).unwrap();
    assert_eq!((pg.rank(), pg.size()), (0, 1));
    pg.barrier().unwrap();
    drop(pg);

    rt.finalize().unwrap();
    assert!(ProcessGroup::from_global(opts, None).is_err());
}

#[test]
fn test_groups_on_one_runtime_are_independent() {
    let fabric = LocalFabric::new(2);
    std::thread::scope(|s| {
        for rank in 0..2 {
            let fabric = &fabric;
            s.spawn(move || {
                let env = Arc::new(fabric.environment(rank).unwrap());
                let rt = EngineRuntime::new(env);
                let a = ProcessGroup::new(Arc::clone(&rt), ProcessGroupOptions::new(), None)
                    .unwrap();
                let b = ProcessGroup::new(Arc::clone(&rt), ProcessGroupOptions::new(), None)
                    .unwrap();
                let ta = Tensor::from_vec(vec![1i32]);
                let tb = Tensor::from_vec(vec![10i32]);
                // Rank 1 issues on the second group first; communicators keep
                // separate call sequences.
                let (mut wa, mut wb) = if rank == 0 {
                    let wa = a.all_reduce(std::slice::from_ref(&ta), ReduceOp::Sum).unwrap();
                    let wb = b.all_reduce(std::slice::from_ref(&tb), ReduceOp::Sum).unwrap();
                    (wa, wb)
                } else {
                    let wb = b.all_reduce(std::slice::from_ref(&tb), ReduceOp::Sum).unwrap();
                    let wa = a.all_reduce(std::slice::from_ref(&ta), ReduceOp::Sum).unwrap();
                    (wa, wb)
                };
                wa.wait().unwrap();
                wb.wait().unwrap();
                assert_eq!(ta.to_vec::<i32>().unwrap(), vec![2]);
                assert_eq!(tb.to_vec::<i32>().unwrap(), vec![20]);
            });
        }
    });
}

#[test]
fn test_group_reports_configuration() {
    run_ranks(2, |pg| {
        assert_eq!(pg.backend_name(), "ccl");
        assert_eq!(pg.timeout(), Duration::from_secs(30 * 60));
        assert!(pg.store().is_none());
    });
}

const EXIT_CHILD: &str = "CCLPG_TEST_EXIT_TEARDOWN";

#[test]
fn test_global_runtime_finalized_at_exit() {
    if std::env::var_os(EXIT_CHILD).is_some() {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .init();
        let fabric = LocalFabric::new(1);
        EngineRuntime::install_global(Arc::new(fabric.environment(0).unwrap())).unwrap();
        let pg = ProcessGroup::from_global(ProcessGroupOptions::new(), None).unwrap();
        pg.barrier().unwrap();
        drop(pg);
        // Nothing finalizes before the process exits.
        assert!(EngineRuntime::global().unwrap().is_initialized());
        return;
    }

    let out = rerun_as_child(
        "collective::runtime::test_global_runtime_finalized_at_exit",
        EXIT_CHILD,
    );
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(out.status.success(), "{stderr}");
    assert!(stderr.contains("engine runtime finalized"), "{stderr}");
}
