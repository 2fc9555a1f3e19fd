use cclpg::{CclError, DataType, Device, Tensor};

use super::helpers::run_ranks;

#[test]
fn test_broadcast_from_root_1_three_ranks() {
    run_ranks(3, |pg| {
        let t = if pg.rank() == 1 {
            Tensor::from_vec(vec![9i32])
        } else {
            Tensor::zeros(&[1], DataType::I32)
        };
        let mut work = pg.broadcast(std::slice::from_ref(&t), 1).unwrap();
        work.wait().unwrap();
        assert_eq!(t.to_vec::<i32>().unwrap(), vec![9], "rank {}", pg.rank());
    });
}

#[test]
fn test_broadcast_2d_from_last_rank() {
    run_ranks(4, |pg| {
        let root = 3;
        let t = if pg.rank() == root {
            Tensor::from_slice(&[1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap()
        } else {
            Tensor::zeros(&[2, 3], DataType::F64)
        };
        let mut work = pg.broadcast(std::slice::from_ref(&t), root).unwrap();
        while !work.poll().unwrap() {
            std::thread::yield_now();
        }
        assert_eq!(
            t.to_vec::<f64>().unwrap(),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
        );
    });
}

#[test]
fn test_broadcast_invalid_root() {
    run_ranks(2, |pg| {
        let t = Tensor::zeros(&[1], DataType::F32);
        let err = pg.broadcast(std::slice::from_ref(&t), 2).unwrap_err();
        assert!(matches!(
            err,
            CclError::InvalidRank {
                rank: 2,
                world_size: 2
            }
        ));
    });
}

#[test]
fn test_broadcast_rejects_device_and_sparse_buffers() {
    run_ranks(2, |pg| {
        let cuda = Tensor::zeros(&[1], DataType::F32).on_device(Device::Cuda(0));
        assert!(pg.broadcast(&[cuda], 0).is_err());
        let sparse = Tensor::sparse(&[3], DataType::F32);
        assert!(pg.broadcast(&[sparse], 0).is_err());
    });
}
