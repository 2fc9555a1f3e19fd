use cclpg::{DataType, Tensor};

use super::helpers::run_ranks;

#[test]
fn test_allgather_flat_output() {
    run_ranks(3, |pg| {
        let input = Tensor::from_vec(vec![pg.rank() as i32 + 1]);
        let base = Tensor::zeros(&[3], DataType::I32);
        let outputs = base.split_with_sizes(&[1, 1, 1]).unwrap();
        let mut work = pg
            .all_gather(&[outputs], std::slice::from_ref(&input))
            .unwrap();
        work.wait().unwrap();
        assert_eq!(base.to_vec::<i32>().unwrap(), vec![1, 2, 3]);
        assert_eq!(work.result().unwrap().len(), 3);
    });
}

#[test]
fn test_allgather_non_flat_uneven_output() {
    run_ranks(2, |pg| {
        let r = pg.rank();
        let input = Tensor::from_vec(vec![(r + 1) as f32; r + 1]);
        let outputs = vec![
            Tensor::zeros(&[1], DataType::F32),
            Tensor::zeros(&[2], DataType::F32),
        ];
        let mut work = pg
            .all_gather(&[outputs.clone()], std::slice::from_ref(&input))
            .unwrap();
        work.wait().unwrap();
        assert_eq!(outputs[0].to_vec::<f32>().unwrap(), vec![1.0]);
        assert_eq!(outputs[1].to_vec::<f32>().unwrap(), vec![2.0, 2.0]);
    });
}

#[test]
fn test_allgather_count_mismatch_is_rejected() {
    run_ranks(2, |pg| {
        let input = Tensor::zeros(&[3], DataType::F32);
        let outputs = vec![
            Tensor::zeros(&[2], DataType::F32),
            Tensor::zeros(&[2], DataType::F32),
        ];
        let err = pg
            .all_gather(&[outputs.clone()], std::slice::from_ref(&input))
            .unwrap_err();
        assert!(err.to_string().contains("send and recv count"));
        assert!(pg
            .all_gather(&[outputs.clone(), outputs], std::slice::from_ref(&input))
            .is_err());
        assert!(pg
            .all_gather(&[vec![Tensor::zeros(&[3], DataType::F32)]], &[input])
            .is_err());
    });
}
