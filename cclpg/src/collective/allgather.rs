use super::validate::{check_list_len, check_same_type, check_single_tensor, single_list};
use super::{Context, OpType, Work};
use crate::engine::{RecvBuffer, engine_call, to_engine_dtype};
use crate::error::{CclError, Result};
use crate::layout::analyze;
use crate::tensor::Tensor;

const OP: &str = "allgather";

/// Gather every rank's input into `outputs[0][r]` on all ranks.
///
/// Output segments may differ in length; rank `r`'s input must match the
/// length of `outputs[0][r]`. A flat output list is received into directly.
/// Otherwise the engine writes each rank's segment into its own buffer, so
/// there is no staging copy.
pub(crate) fn allgather(
    ctx: &Context<'_>,
    outputs: &[Vec<Tensor>],
    inputs: &[Tensor],
) -> Result<Work> {
    let input = check_single_tensor(OP, inputs)?;
    let outputs = single_list(OP, outputs)?;
    check_list_len(OP, "output", outputs, ctx.size)?;
    check_same_type(OP, input, outputs)?;

    let (layout, recv_counts) = analyze(outputs)?;
    let count = input.numel();
    if recv_counts.get(ctx.rank) != Some(&count) {
        return Err(CclError::invalid(OP, "send and recv count doesn't match"));
    }
    let dtype = to_engine_dtype(input.dtype(), OP)?;

    let recv = if layout.is_flat {
        RecvBuffer::Contiguous(&layout.representative)
    } else {
        RecvBuffer::Vector(outputs)
    };
    tracing::debug!(count, flat = layout.is_flat, "dispatching allgatherv");
    let request = engine_call!(
        ctx.lock,
        ctx.comm.allgatherv(input, count, recv, &recv_counts, dtype)
    )?;

    let mut buffers = if layout.is_flat {
        vec![layout.representative.clone()]
    } else {
        outputs.to_vec()
    };
    buffers.push(input.clone());

    Ok(ctx.pending(
        OpType::AllGather,
        count,
        request,
        buffers,
        outputs.to_vec(),
    ))
}
