use cclpg::{DataType, Tensor};

use super::helpers::run_ranks;

#[test]
fn test_gather_non_flat_root_output_is_stitched_in_rank_order() {
    run_ranks(2, |pg| {
        let rank = pg.rank() as f32;
        let input = Tensor::from_vec(vec![rank * 10.0, rank * 10.0 + 1.0]);
        if pg.rank() == 0 {
            let outputs = vec![
                Tensor::zeros(&[2], DataType::F32),
                Tensor::zeros(&[2], DataType::F32),
            ];
            let mut work = pg
                .gather(&[outputs.clone()], std::slice::from_ref(&input), 0)
                .unwrap();
            // The stitch already happened; the handle starts completed.
            assert!(work.is_success().unwrap());
            assert!(work.poll().unwrap());
            assert_eq!(outputs[0].to_vec::<f32>().unwrap(), vec![0.0, 1.0]);
            assert_eq!(outputs[1].to_vec::<f32>().unwrap(), vec![10.0, 11.0]);
            assert_eq!(work.result().unwrap().len(), 2);
        } else {
            let mut work = pg.gather(&[], std::slice::from_ref(&input), 0).unwrap();
            assert!(work.wait().unwrap());
            assert!(work.result().unwrap().is_empty());
            assert_eq!(input.to_vec::<f32>().unwrap(), vec![10.0, 11.0]);
        }
    });
}

#[test]
fn test_gather_flat_root_output_receives_in_place() {
    run_ranks(3, |pg| {
        let root = 1;
        let r = pg.rank() as i64;
        let input = Tensor::from_vec(vec![r; 2]);
        if pg.rank() == root {
            let base = Tensor::zeros(&[6], DataType::I64);
            let outputs = base.split_with_sizes(&[2, 2, 2]).unwrap();
            let mut work = pg
                .gather(&[outputs], std::slice::from_ref(&input), root)
                .unwrap();
            work.wait().unwrap();
            assert_eq!(base.to_vec::<i64>().unwrap(), vec![0, 0, 1, 1, 2, 2]);
        } else {
            pg.gather(&[], std::slice::from_ref(&input), root)
                .unwrap()
                .wait()
                .unwrap();
        }
    });
}

#[test]
fn test_gather_uneven_contributions() {
    run_ranks(3, |pg| {
        let r = pg.rank();
        let input = Tensor::from_vec(vec![r as u8; r + 1]);
        if r == 2 {
            let outputs: Vec<Tensor> = (0..3)
                .map(|i| Tensor::zeros(&[i + 1], DataType::U8))
                .collect();
            let mut work = pg
                .gather(&[outputs.clone()], std::slice::from_ref(&input), 2)
                .unwrap();
            work.wait().unwrap();
            assert_eq!(outputs[0].to_vec::<u8>().unwrap(), vec![0]);
            assert_eq!(outputs[1].to_vec::<u8>().unwrap(), vec![1, 1]);
            assert_eq!(outputs[2].to_vec::<u8>().unwrap(), vec![2, 2, 2]);
        } else {
            pg.gather(&[], std::slice::from_ref(&input), 2)
                .unwrap()
                .wait()
                .unwrap();
        }
    });
}

#[test]
fn test_gather_argument_checks() {
    run_ranks(2, |pg| {
        let input = Tensor::zeros(&[2], DataType::F32);
        let outputs = vec![
            Tensor::zeros(&[2], DataType::F32),
            Tensor::zeros(&[2], DataType::F32),
        ];
        if pg.rank() == 0 {
            // Root: wrong list count, multi-GPU, and dtype mismatch.
            assert!(pg
                .gather(&[outputs[..1].to_vec()], std::slice::from_ref(&input), 0)
                .is_err());
            assert!(pg
                .gather(
                    &[outputs.clone(), outputs.clone()],
                    std::slice::from_ref(&input),
                    0
                )
                .is_err());
            let ints = vec![
                Tensor::zeros(&[2], DataType::I32),
                Tensor::zeros(&[2], DataType::I32),
            ];
            assert!(pg.gather(&[ints], std::slice::from_ref(&input), 0).is_err());
        } else {
            // Non-root must not pass outputs.
            let err = pg
                .gather(&[outputs], std::slice::from_ref(&input), 0)
                .unwrap_err();
            assert!(err.to_string().contains("non-root"));
        }
        assert!(pg.gather(&[], std::slice::from_ref(&input), 2).is_err());
    });
}
