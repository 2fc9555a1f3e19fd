//! Collective dispatch: validation, layout analysis, one engine call, and a
//! [`Work`] handle that keeps the touched buffers alive.
//!
//! Gather, scatter and the list form of all-to-all have no engine primitive
//! of their own and are built on the variable-length all-to-all.

mod allgather;
mod allreduce;
mod alltoall;
mod barrier;
mod broadcast;
mod gather;
mod reduce;
mod scatter;
mod validate;
mod work;

use std::sync::Arc;

pub use work::{Work, WorkGroup};

use crate::engine::{Communicator, Request, SubmissionLock};
use crate::error::{CclError, Result};
use crate::tensor::Tensor;
use crate::types::{Rank, ReduceOp};

/// Kind of collective a [`Work`] handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpType {
    Broadcast,
    AllReduce,
    Reduce,
    AllGather,
    Gather,
    Scatter,
    AllToAllBase,
    AllToAll,
    Barrier,
}

impl OpType {
    /// Short name used as the `debug_name` prefix.
    pub const fn name(self) -> &'static str {
        match self {
            OpType::Broadcast => "bcast",
            OpType::AllReduce => "allreduce",
            OpType::Reduce => "reduce",
            OpType::AllGather => "allgather",
            OpType::Gather => "gather",
            OpType::Scatter => "scatter",
            OpType::AllToAllBase => "alltoall_base",
            OpType::AllToAll => "alltoall",
            OpType::Barrier => "barrier",
        }
    }
}

impl std::fmt::Display for OpType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One collective request with its arguments.
///
/// List-of-list arguments carry one inner list per local device; only a
/// single inner list is supported.
#[derive(Debug, Clone)]
pub enum Collective {
    Broadcast {
        tensors: Vec<Tensor>,
        root: Rank,
    },
    AllReduce {
        tensors: Vec<Tensor>,
        op: ReduceOp,
    },
    Reduce {
        tensors: Vec<Tensor>,
        op: ReduceOp,
        root: Rank,
    },
    AllGather {
        outputs: Vec<Vec<Tensor>>,
        inputs: Vec<Tensor>,
    },
    /// Non-root ranks pass no output lists.
    Gather {
        outputs: Vec<Vec<Tensor>>,
        inputs: Vec<Tensor>,
        root: Rank,
    },
    /// Non-root ranks pass no input lists.
    Scatter {
        outputs: Vec<Tensor>,
        inputs: Vec<Vec<Tensor>>,
        root: Rank,
    },
    /// Empty split sizes mean equal division along dim 0.
    AllToAllBase {
        output: Tensor,
        input: Tensor,
        output_split_sizes: Vec<usize>,
        input_split_sizes: Vec<usize>,
    },
    AllToAll {
        outputs: Vec<Tensor>,
        inputs: Vec<Tensor>,
    },
    Barrier,
}

impl Collective {
    pub fn op_type(&self) -> OpType {
        match self {
            Collective::Broadcast { .. } => OpType::Broadcast,
            Collective::AllReduce { .. } => OpType::AllReduce,
            Collective::Reduce { .. } => OpType::Reduce,
            Collective::AllGather { .. } => OpType::AllGather,
            Collective::Gather { .. } => OpType::Gather,
            Collective::Scatter { .. } => OpType::Scatter,
            Collective::AllToAllBase { .. } => OpType::AllToAllBase,
            Collective::AllToAll { .. } => OpType::AllToAll,
            Collective::Barrier => OpType::Barrier,
        }
    }
}

/// What a dispatcher needs from its process group.
pub(crate) struct Context<'a> {
    pub(crate) comm: &'a dyn Communicator,
    pub(crate) lock: &'a Arc<SubmissionLock>,
    pub(crate) rank: Rank,
    pub(crate) size: usize,
}

impl Context<'_> {
    fn pending(
        &self,
        op_type: OpType,
        elements: usize,
        request: Box<dyn Request>,
        buffers: Vec<Tensor>,
        outputs: Vec<Tensor>,
    ) -> Work {
        Work::pending(
            Arc::clone(self.lock),
            op_type,
            debug_name(op_type, elements),
            request,
            buffers,
            outputs,
        )
    }

    fn completed(&self, op_type: OpType, elements: usize, outputs: Vec<Tensor>) -> Work {
        Work::completed(
            Arc::clone(self.lock),
            op_type,
            debug_name(op_type, elements),
            outputs,
        )
    }
}

fn debug_name(op_type: OpType, elements: usize) -> String {
    format!("{}::sz:{elements}", op_type.name())
}

pub(crate) fn dispatch(ctx: &Context<'_>, collective: Collective) -> Result<Work> {
    match collective {
        Collective::Broadcast { tensors, root } => broadcast::broadcast(ctx, &tensors, root),
        Collective::AllReduce { tensors, op } => allreduce::allreduce(ctx, &tensors, op),
        Collective::Reduce { tensors, op, root } => reduce::reduce(ctx, &tensors, op, root),
        Collective::AllGather { outputs, inputs } => allgather::allgather(ctx, &outputs, &inputs),
        Collective::Gather {
            outputs,
            inputs,
            root,
        } => gather::gather(ctx, &outputs, &inputs, root),
        Collective::Scatter {
            outputs,
            inputs,
            root,
        } => scatter::scatter(ctx, &outputs, &inputs, root),
        Collective::AllToAllBase {
            output,
            input,
            output_split_sizes,
            input_split_sizes,
        } => alltoall::alltoall_base(
            ctx,
            &output,
            &input,
            &output_split_sizes,
            &input_split_sizes,
        ),
        Collective::AllToAll { outputs, inputs } => alltoall::alltoall(ctx, &outputs, &inputs),
        Collective::Barrier => barrier::barrier(ctx),
    }
}

/// Rejection for operations this process group never supports.
pub(crate) fn unsupported(operation: &'static str) -> Result<Work> {
    Err(CclError::UnsupportedOperation { operation })
}
