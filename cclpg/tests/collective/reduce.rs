use cclpg::{ReduceOp, Tensor};

use super::helpers::run_ranks;

#[test]
fn test_reduce_sum_to_root() {
    run_ranks(3, |pg| {
        let root = 2;
        let r = pg.rank() as i32;
        let t = Tensor::from_vec(vec![r, 10 * r]);
        pg.reduce(std::slice::from_ref(&t), ReduceOp::Sum, root)
            .unwrap()
            .wait()
            .unwrap();
        if pg.rank() == root {
            assert_eq!(t.to_vec::<i32>().unwrap(), vec![3, 30]);
        } else {
            assert_eq!(t.to_vec::<i32>().unwrap(), vec![r, 10 * r]);
        }
    });
}

#[test]
fn test_reduce_rejects_bitwise_ops() {
    run_ranks(2, |pg| {
        let t = Tensor::from_vec(vec![1u8]);
        assert!(pg.reduce(std::slice::from_ref(&t), ReduceOp::BXor, 0).is_err());
        assert!(pg.reduce(std::slice::from_ref(&t), ReduceOp::Sum, 5).is_err());
    });
}
