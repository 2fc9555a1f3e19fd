use super::validate::{check_rank, check_single_tensor};
use super::{Context, OpType, Work};
use crate::engine::{engine_call, to_engine_dtype, to_engine_op};
use crate::error::Result;
use crate::tensor::Tensor;
use crate::types::{Rank, ReduceOp};

/// In-place reduce. Every rank contributes `tensors[0]`; only `root`'s
/// buffer receives the result.
pub(crate) fn reduce(
    ctx: &Context<'_>,
    tensors: &[Tensor],
    op: ReduceOp,
    root: Rank,
) -> Result<Work> {
    let tensor = check_single_tensor("reduce", tensors)?;
    check_rank(root, ctx.size)?;
    let count = tensor.numel();
    let dtype = to_engine_dtype(tensor.dtype(), "reduce")?;
    let reduction = to_engine_op(op, "reduce")?;

    tracing::debug!(count, %op, root, "dispatching reduce");
    let request = engine_call!(
        ctx.lock,
        ctx.comm.reduce(tensor, tensor, count, dtype, reduction, root)
    )?;

    Ok(ctx.pending(
        OpType::Reduce,
        count,
        request,
        vec![tensor.clone()],
        vec![tensor.clone()],
    ))
}
