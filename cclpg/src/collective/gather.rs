use super::validate::{
    check_list_len, check_rank, check_same_type, check_single_tensor, single_list,
};
use super::{Context, OpType, Work};
use crate::engine::{engine_call, to_engine_dtype};
use crate::error::{CclError, Result};
use crate::layout::flatten_or_stage;
use crate::staging::{gather_from, stage};
use crate::tensor::Tensor;
use crate::types::Rank;

const OP: &str = "gather";

/// Collect every rank's input into `outputs[0]` on `root`.
///
/// Built on the variable-length all-to-all: each rank sends only to `root`,
/// and only `root` receives. Non-root ranks pass no output lists.
///
/// When `root`'s output list is not flat the call waits for the engine,
/// copies the staged result into the caller's buffers, and returns a
/// completed handle.
pub(crate) fn gather(
    ctx: &Context<'_>,
    outputs: &[Vec<Tensor>],
    inputs: &[Tensor],
    root: Rank,
) -> Result<Work> {
    let input = check_single_tensor(OP, inputs)?;
    check_rank(root, ctx.size)?;

    let root_outputs = if ctx.rank == root {
        let list = single_list(OP, outputs)?;
        check_list_len(OP, "output", list, ctx.size)?;
        check_same_type(OP, input, list)?;
        Some(list)
    } else {
        if !outputs.is_empty() {
            return Err(CclError::invalid(
                OP,
                "number of output tensors should be 0 for non-root",
            ));
        }
        None
    };

    let count = input.numel();
    let mut send_counts = vec![0; ctx.size];
    send_counts[root] = count;

    let staged = match root_outputs {
        Some(list) => {
            let f = flatten_or_stage(list)?;
            if f.lengths[ctx.rank] != count {
                return Err(CclError::invalid(OP, "send and recv count doesn't match"));
            }
            Some(f)
        }
        None => None,
    };
    let (recv_buf, recv_counts) = match &staged {
        Some(f) => (f.buffer.clone(), f.lengths.clone()),
        None => (input.new_empty(&[0]), vec![0; ctx.size]),
    };
    let dtype = to_engine_dtype(recv_buf.dtype(), OP)?;

    tracing::debug!(
        count,
        root,
        flat = staged.as_ref().is_none_or(|f| f.is_flat),
        "dispatching gather"
    );
    let mut request = engine_call!(
        ctx.lock,
        ctx.comm
            .alltoallv(input, &send_counts, &recv_buf, &recv_counts, dtype)
    )?;

    match (staged, root_outputs) {
        (Some(f), Some(list)) if !f.is_flat => {
            tracing::warn!(count, "gather: output not flat, completing synchronously");
            engine_call!(ctx.lock, request.wait())?;
            gather_from(&stage(&f.buffer, &f.lengths)?, list)?;
            Ok(ctx.completed(OpType::Gather, count, list.to_vec()))
        }
        (Some(f), Some(list)) => Ok(ctx.pending(
            OpType::Gather,
            count,
            request,
            vec![f.buffer, input.clone()],
            list.to_vec(),
        )),
        _ => Ok(ctx.pending(
            OpType::Gather,
            count,
            request,
            vec![input.clone()],
            Vec::new(),
        )),
    }
}
