use cclpg::{CclError, DataType, Tensor};

use super::helpers::run_ranks;

#[test]
fn test_alltoall_base_equal_splits() {
    run_ranks(2, |pg| {
        let r = pg.rank() as i32;
        let input = Tensor::from_vec((0..4).map(|i| 10 * r + i).collect());
        let output = Tensor::zeros(&[4], DataType::I32);
        let mut work = pg.all_to_all_base(&output, &input, &[], &[]).unwrap();
        work.wait().unwrap();
        let expected = if r == 0 {
            vec![0, 1, 10, 11]
        } else {
            vec![2, 3, 12, 13]
        };
        assert_eq!(output.to_vec::<i32>().unwrap(), expected);
        assert_eq!(work.debug_name(), "alltoall_base::sz:2");
    });
}

#[test]
fn test_alltoall_base_rejects_uneven_dim0() {
    run_ranks(2, |pg| {
        let input = Tensor::zeros(&[3], DataType::F32);
        let output = Tensor::zeros(&[3], DataType::F32);
        let err = pg.all_to_all_base(&output, &input, &[], &[]).unwrap_err();
        assert!(matches!(err, CclError::InvalidArgument { .. }));
        assert!(err.to_string().contains("dim 0"));
    });
}

#[test]
fn test_alltoall_base_rejects_size_or_type_mismatch() {
    run_ranks(2, |pg| {
        let input = Tensor::zeros(&[4], DataType::F32);
        assert!(pg
            .all_to_all_base(&Tensor::zeros(&[2], DataType::F32), &input, &[], &[])
            .is_err());
        assert!(pg
            .all_to_all_base(&Tensor::zeros(&[4], DataType::I32), &input, &[], &[])
            .is_err());
    });
}

#[test]
fn test_alltoall_base_explicit_splits() {
    run_ranks(2, |pg| {
        let (input, input_splits, output, output_splits) = if pg.rank() == 0 {
            (
                Tensor::from_slice(&[0i64, 1, 2, 3, 4, 5], &[3, 2]).unwrap(),
                vec![1, 2],
                Tensor::zeros(&[3, 2], DataType::I64),
                vec![1, 2],
            )
        } else {
            (
                Tensor::from_slice(&[10i64, 11, 12, 13], &[2, 2]).unwrap(),
                vec![2, 0],
                Tensor::zeros(&[2, 2], DataType::I64),
                vec![2, 0],
            )
        };
        let mut work = pg
            .all_to_all_base(&output, &input, &output_splits, &input_splits)
            .unwrap();
        work.wait().unwrap();
        let expected = if pg.rank() == 0 {
            vec![0, 1, 10, 11, 12, 13]
        } else {
            vec![2, 3, 4, 5]
        };
        assert_eq!(output.to_vec::<i64>().unwrap(), expected);
    });
}

#[test]
fn test_alltoall_base_bad_split_table() {
    run_ranks(2, |pg| {
        let t = Tensor::zeros(&[4], DataType::F32);
        assert!(pg.all_to_all_base(&t, &t, &[1, 1], &[2, 2]).is_err());
        assert!(pg.all_to_all_base(&t, &t, &[4], &[]).is_err());
    });
}

#[test]
fn test_alltoall_lists_non_flat_output_completes_synchronously() {
    run_ranks(2, |pg| {
        let r = pg.rank() as u8;
        let inputs: Vec<Tensor> = (0..2u8)
            .map(|j| Tensor::from_vec(vec![10 * r + j; 2]))
            .collect();
        let outputs = vec![
            Tensor::zeros(&[2], DataType::U8),
            Tensor::zeros(&[2], DataType::U8),
        ];
        let work = pg.all_to_all(&outputs, &inputs).unwrap();
        assert!(work.is_success().unwrap());
        for (j, out) in outputs.iter().enumerate() {
            assert_eq!(out.to_vec::<u8>().unwrap(), vec![10 * j as u8 + r; 2]);
        }
    });
}

#[test]
fn test_alltoall_lists_flat_output() {
    run_ranks(3, |pg| {
        let r = pg.rank() as f32;
        let inputs: Vec<Tensor> = (0..3)
            .map(|j| Tensor::from_vec(vec![r * 100.0 + j as f32]))
            .collect();
        let base = Tensor::zeros(&[3], DataType::F32);
        let outputs = base.split_with_sizes(&[1, 1, 1]).unwrap();
        let mut work = pg.all_to_all(&outputs, &inputs).unwrap();
        work.wait().unwrap();
        assert_eq!(
            base.to_vec::<f32>().unwrap(),
            vec![r, 100.0 + r, 200.0 + r]
        );
    });
}

#[test]
fn test_alltoall_lists_must_match_world_size() {
    run_ranks(2, |pg| {
        let one = vec![Tensor::zeros(&[1], DataType::F32)];
        let two = vec![Tensor::zeros(&[1], DataType::F32); 2];
        assert!(pg.all_to_all(&one, &two).is_err());
        assert!(pg.all_to_all(&two, &one).is_err());
        let ints = vec![Tensor::zeros(&[1], DataType::I32); 2];
        assert!(pg.all_to_all(&two, &ints).is_err());
    });
}
