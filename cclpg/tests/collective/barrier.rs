use std::sync::atomic::{AtomicUsize, Ordering};

use super::helpers::run_ranks;

#[test]
fn test_barrier_all_ranks_arrive_before_any_leaves() {
    let arrived = AtomicUsize::new(0);
    run_ranks(4, |pg| {
        arrived.fetch_add(1, Ordering::SeqCst);
        let mut work = pg.barrier().unwrap();
        assert_eq!(arrived.load(Ordering::SeqCst), 4);
        assert!(work.poll().unwrap());
        assert!(work.is_success().unwrap());
        assert!(work.result().unwrap().is_empty());
    });
}

#[test]
fn test_repeated_barriers() {
    run_ranks(3, |pg| {
        for _ in 0..5 {
            pg.barrier().unwrap();
        }
    });
}
