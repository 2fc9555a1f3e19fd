//! Argument checks run before any engine call.

use crate::error::{CclError, Result};
use crate::tensor::Tensor;
use crate::types::{Device, Rank};

/// Contiguous, dense, host-resident.
pub(crate) fn check_tensor(operation: &'static str, tensor: &Tensor) -> Result<()> {
    if !tensor.is_contiguous() {
        return Err(CclError::invalid(operation, "input tensor has to be contiguous"));
    }
    if tensor.is_sparse() {
        return Err(CclError::invalid(operation, "input tensor has to be dense"));
    }
    if let Device::Cuda(_) = tensor.device() {
        return Err(CclError::invalid(
            operation,
            "CUDA tensor detected and CCL doesn't support CUDA buffers",
        ));
    }
    Ok(())
}

/// Exactly one valid tensor.
pub(crate) fn check_single_tensor<'a>(
    operation: &'static str,
    tensors: &'a [Tensor],
) -> Result<&'a Tensor> {
    let [tensor] = tensors else {
        return Err(CclError::invalid(
            operation,
            format!(
                "CCL process group does not support tensors count {}",
                tensors.len()
            ),
        ));
    };
    check_tensor(operation, tensor)?;
    Ok(tensor)
}

pub(crate) fn check_rank(rank: Rank, world_size: usize) -> Result<()> {
    if rank >= world_size {
        return Err(CclError::InvalidRank { rank, world_size });
    }
    Ok(())
}

/// Every tensor in `tensors` is valid and has `reference`'s dtype.
pub(crate) fn check_same_type(
    operation: &'static str,
    reference: &Tensor,
    tensors: &[Tensor],
) -> Result<()> {
    for t in tensors {
        if t.dtype() != reference.dtype() {
            return Err(CclError::invalid(
                operation,
                "tensors are not equal in data type",
            ));
        }
        check_tensor(operation, t)?;
    }
    Ok(())
}

/// The single per-call tensor list of a list-of-lists argument.
pub(crate) fn single_list<'a>(
    operation: &'static str,
    lists: &'a [Vec<Tensor>],
) -> Result<&'a [Tensor]> {
    match lists {
        [list] => Ok(list),
        _ => Err(CclError::invalid(
            operation,
            "multi-GPU collective is not supported",
        )),
    }
}

pub(crate) fn check_list_len(
    operation: &'static str,
    what: &str,
    list: &[Tensor],
    world_size: usize,
) -> Result<()> {
    if list.len() != world_size {
        return Err(CclError::invalid(
            operation,
            format!("number of {what} tensors should equal to the world size"),
        ));
    }
    Ok(())
}
