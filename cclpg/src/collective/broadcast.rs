use super::validate::{check_rank, check_single_tensor};
use super::{Context, OpType, Work};
use crate::engine::{engine_call, to_engine_dtype};
use crate::error::Result;
use crate::tensor::Tensor;
use crate::types::Rank;

/// Broadcast `tensors[0]` from `root` to every rank, in place.
pub(crate) fn broadcast(ctx: &Context<'_>, tensors: &[Tensor], root: Rank) -> Result<Work> {
    let tensor = check_single_tensor("broadcast", tensors)?;
    check_rank(root, ctx.size)?;
    let count = tensor.numel();
    let dtype = to_engine_dtype(tensor.dtype(), "broadcast")?;

    tracing::debug!(count, root, "dispatching bcast");
    let request = engine_call!(ctx.lock, ctx.comm.bcast(tensor, count, dtype, root))?;

    Ok(ctx.pending(
        OpType::Broadcast,
        count,
        request,
        vec![tensor.clone()],
        vec![tensor.clone()],
    ))
}
