use super::validate::{
    check_list_len, check_rank, check_same_type, check_single_tensor, single_list,
};
use super::{Context, OpType, Work};
use crate::engine::{engine_call, to_engine_dtype};
use crate::error::{CclError, Result};
use crate::layout::flatten_or_stage;
use crate::staging::{scatter_into, stage};
use crate::tensor::Tensor;
use crate::types::Rank;

const OP: &str = "scatter";

/// Send `inputs[0][r]` from `root` to rank `r`'s `outputs[0]`.
///
/// Mirror of gather. A non-flat input list on `root` is copied into a staging
/// buffer before dispatch, so the engine always sends from one buffer.
pub(crate) fn scatter(
    ctx: &Context<'_>,
    outputs: &[Tensor],
    inputs: &[Vec<Tensor>],
    root: Rank,
) -> Result<Work> {
    let output = check_single_tensor(OP, outputs)?;
    check_rank(root, ctx.size)?;

    let count = output.numel();
    let mut recv_counts = vec![0; ctx.size];
    recv_counts[root] = count;

    let is_root = ctx.rank == root;
    let (send_buf, send_counts, flat) = if is_root {
        let list = single_list(OP, inputs)?;
        check_list_len(OP, "input", list, ctx.size)?;
        check_same_type(OP, output, list)?;

        let f = flatten_or_stage(list)?;
        if !f.is_flat {
            scatter_into(&stage(&f.buffer, &f.lengths)?, list)?;
        }
        if f.lengths[ctx.rank] != count {
            return Err(CclError::invalid(OP, "send and recv count doesn't match"));
        }
        (f.buffer, f.lengths, f.is_flat)
    } else {
        if !inputs.is_empty() {
            return Err(CclError::invalid(
                OP,
                "number of input tensors should be 0 for non-root",
            ));
        }
        (output.new_empty(&[0]), vec![0; ctx.size], true)
    };
    let dtype = to_engine_dtype(send_buf.dtype(), OP)?;

    tracing::debug!(count, root, flat, "dispatching scatter");
    let request = engine_call!(
        ctx.lock,
        ctx.comm
            .alltoallv(&send_buf, &send_counts, output, &recv_counts, dtype)
    )?;

    let mut buffers = vec![output.clone()];
    if is_root {
        buffers.push(send_buf);
    }
    Ok(ctx.pending(
        OpType::Scatter,
        count,
        request,
        buffers,
        vec![output.clone()],
    ))
}
