use super::{Context, OpType, Work};
use crate::engine::engine_call;
use crate::error::Result;

/// Blocks on the engine barrier and returns an already completed handle.
pub(crate) fn barrier(ctx: &Context<'_>) -> Result<Work> {
    tracing::debug!("dispatching barrier");
    engine_call!(ctx.lock, ctx.comm.barrier())?;
    Ok(ctx.completed(OpType::Barrier, 0, Vec::new()))
}
