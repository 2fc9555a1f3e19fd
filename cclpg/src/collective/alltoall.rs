use super::validate::{check_list_len, check_same_type, check_tensor};
use super::{Context, OpType, Work};
use crate::engine::{engine_call, to_engine_dtype};
use crate::error::{CclError, Result};
use crate::layout::flatten_or_stage;
use crate::staging::{check_split_sizes, gather_from, scatter_into, stage};
use crate::tensor::Tensor;

/// Per-rank element counts for one side of an all-to-all with splits.
///
/// An empty table divides the tensor equally; otherwise entry `r` counts
/// rows of dim 0 for rank `r`.
fn split_counts(tensor: &Tensor, split_sizes: &[usize], size: usize) -> Result<Vec<usize>> {
    let equal = split_sizes.is_empty();
    // The element count can be zero, so equality is tracked separately.
    let mut len = tensor.numel();
    if len != 0 {
        len /= if equal { size } else { tensor.size(0)? };
    }
    Ok((0..size)
        .map(|r| if equal { len } else { split_sizes[r] * len })
        .collect())
}

/// Exchange dim-0 slices of one input tensor with every rank.
///
/// Without split sizes this uses the fixed-size all-to-all; with any split
/// table it switches to the variable-length primitive.
pub(crate) fn alltoall_base(
    ctx: &Context<'_>,
    output: &Tensor,
    input: &Tensor,
    output_split_sizes: &[usize],
    input_split_sizes: &[usize],
) -> Result<Work> {
    const OP: &str = "alltoall_base";
    check_tensor(OP, input)?;
    check_tensor(OP, output)?;

    let request = if output_split_sizes.is_empty() && input_split_sizes.is_empty() {
        if output.numel() != input.numel() || output.dtype() != input.dtype() {
            return Err(CclError::invalid(
                OP,
                "tensors are not equal in size or data type",
            ));
        }
        if output.size(0)? % ctx.size != 0 {
            return Err(CclError::invalid(
                OP,
                "tensor's dim 0 does not divide equally across group size",
            ));
        }
        let dtype = to_engine_dtype(output.dtype(), OP)?;
        let count = output.numel() / ctx.size;

        tracing::debug!(count, "dispatching alltoall");
        engine_call!(ctx.lock, ctx.comm.alltoall(input, output, count, dtype))?
    } else {
        check_split_sizes(OP, input_split_sizes, input, ctx.size)?;
        check_split_sizes(OP, output_split_sizes, output, ctx.size)?;
        if output.dtype() != input.dtype() {
            return Err(CclError::invalid(OP, "tensors are not equal in data type"));
        }
        let send_counts = split_counts(input, input_split_sizes, ctx.size)?;
        let recv_counts = split_counts(output, output_split_sizes, ctx.size)?;
        let dtype = to_engine_dtype(output.dtype(), OP)?;

        tracing::debug!(?send_counts, ?recv_counts, "dispatching alltoallv");
        engine_call!(
            ctx.lock,
            ctx.comm
                .alltoallv(input, &send_counts, output, &recv_counts, dtype)
        )?
    };

    Ok(ctx.pending(
        OpType::AllToAllBase,
        (input.numel() + output.numel()) / (2 * ctx.size),
        request,
        vec![input.clone(), output.clone()],
        vec![output.clone()],
    ))
}

/// Send `inputs[r]` to rank `r` and receive rank `r`'s tensor into
/// `outputs[r]`.
///
/// A non-flat input list is staged before dispatch. A non-flat output list
/// makes the call wait for the engine and copy into the caller's buffers,
/// returning a completed handle.
pub(crate) fn alltoall(ctx: &Context<'_>, outputs: &[Tensor], inputs: &[Tensor]) -> Result<Work> {
    const OP: &str = "alltoall";
    check_list_len(OP, "input", inputs, ctx.size)?;
    check_list_len(OP, "output", outputs, ctx.size)?;
    let (Some(first_out), Some(first_in)) = (outputs.first(), inputs.first()) else {
        return Err(CclError::invalid(OP, "empty tensor lists"));
    };
    check_same_type(OP, first_out, inputs)?;
    check_same_type(OP, first_in, outputs)?;

    let send = flatten_or_stage(inputs)?;
    let recv = flatten_or_stage(outputs)?;
    if !send.is_flat {
        scatter_into(&stage(&send.buffer, &send.lengths)?, inputs)?;
    }
    let dtype = to_engine_dtype(recv.buffer.dtype(), OP)?;
    let elements = (send.total_len + recv.total_len) / (2 * ctx.size);

    tracing::debug!(
        elements,
        input_flat = send.is_flat,
        output_flat = recv.is_flat,
        "dispatching alltoall"
    );
    let mut request = engine_call!(
        ctx.lock,
        ctx.comm.alltoallv(
            &send.buffer,
            &send.lengths,
            &recv.buffer,
            &recv.lengths,
            dtype
        )
    )?;

    if !recv.is_flat {
        tracing::warn!(elements, "alltoall: output not flat, completing synchronously");
        engine_call!(ctx.lock, request.wait())?;
        gather_from(&stage(&recv.buffer, &recv.lengths)?, outputs)?;
        return Ok(ctx.completed(OpType::AllToAll, elements, outputs.to_vec()));
    }

    Ok(ctx.pending(
        OpType::AllToAll,
        elements,
        request,
        vec![recv.buffer, send.buffer],
        outputs.to_vec(),
    ))
}
