use super::validate::check_single_tensor;
use super::{Context, OpType, Work};
use crate::engine::{engine_call, to_engine_dtype, to_engine_op};
use crate::error::Result;
use crate::tensor::Tensor;
use crate::types::ReduceOp;

/// In-place all-reduce: `tensors[0]` is both send and receive buffer.
pub(crate) fn allreduce(ctx: &Context<'_>, tensors: &[Tensor], op: ReduceOp) -> Result<Work> {
    let tensor = check_single_tensor("allreduce", tensors)?;
    let count = tensor.numel();
    let dtype = to_engine_dtype(tensor.dtype(), "allreduce")?;
    let reduction = to_engine_op(op, "allreduce")?;

    tracing::debug!(count, %op, "dispatching allreduce");
    let request = engine_call!(
        ctx.lock,
        ctx.comm.allreduce(tensor, tensor, count, dtype, reduction)
    )?;

    Ok(ctx.pending(
        OpType::AllReduce,
        count,
        request,
        vec![tensor.clone()],
        vec![tensor.clone()],
    ))
}
