//! The process group: rank, size, and a dedicated engine communicator.

use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::time::Duration;

use crate::collective::{self, Collective, Context, Work};
use crate::config::ProcessGroupOptions;
use crate::engine::{Communicator, engine_call};
use crate::error::{CclError, Result};
use crate::runtime::EngineRuntime;
use crate::store::Store;
use crate::tensor::Tensor;
use crate::types::{Rank, ReduceOp};

/// A fixed set of ranks issuing collectives through one engine communicator.
///
/// Every collective returns a [`Work`] handle. All ranks must issue the same
/// collectives in the same order.
pub struct ProcessGroup {
    runtime: Arc<EngineRuntime>,
    comm: ManuallyDrop<Arc<dyn Communicator>>,
    rank: Rank,
    size: usize,
    timeout: Duration,
    store: Option<Arc<dyn Store>>,
}

impl ProcessGroup {
    /// Initialize the engine if needed, check the requested rank and size
    /// against it, and create this group's own communicator.
    pub fn new(
        runtime: Arc<EngineRuntime>,
        options: ProcessGroupOptions,
        store: Option<Arc<dyn Store>>,
    ) -> Result<Self> {
        let global = runtime.init_once()?;
        let (rank, size) = (global.rank(), global.size());
        if let Some(requested) = options.rank
            && requested != rank
        {
            return Err(CclError::RankMismatch {
                requested,
                engine: rank,
            });
        }
        if let Some(requested) = options.size
            && requested != size
        {
            return Err(CclError::SizeMismatch {
                requested,
                engine: size,
            });
        }

        let comm = engine_call!(runtime.lock(), runtime.environment().create_communicator())?;
        tracing::info!(rank, size, timeout = ?options.timeout, "process group created");

        Ok(Self {
            runtime,
            comm: ManuallyDrop::new(comm),
            rank,
            size,
            timeout: options.timeout,
            store,
        })
    }

    /// Build a group over the process-wide runtime.
    pub fn from_global(
        options: ProcessGroupOptions,
        store: Option<Arc<dyn Store>>,
    ) -> Result<Self> {
        Self::new(EngineRuntime::global()?, options, store)
    }

    pub fn backend_name(&self) -> &'static str {
        "ccl"
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn store(&self) -> Option<&Arc<dyn Store>> {
        self.store.as_ref()
    }

    /// Dispatch one collective.
    pub fn submit(&self, collective: Collective) -> Result<Work> {
        let ctx = Context {
            comm: &**self.comm,
            lock: self.runtime.lock(),
            rank: self.rank,
            size: self.size,
        };
        collective::dispatch(&ctx, collective)
    }

    pub fn broadcast(&self, tensors: &[Tensor], root: Rank) -> Result<Work> {
        self.submit(Collective::Broadcast {
            tensors: tensors.to_vec(),
            root,
        })
    }

    pub fn all_reduce(&self, tensors: &[Tensor], op: ReduceOp) -> Result<Work> {
        self.submit(Collective::AllReduce {
            tensors: tensors.to_vec(),
            op,
        })
    }

    pub fn reduce(&self, tensors: &[Tensor], op: ReduceOp, root: Rank) -> Result<Work> {
        self.submit(Collective::Reduce {
            tensors: tensors.to_vec(),
            op,
            root,
        })
    }

    pub fn all_gather(&self, outputs: &[Vec<Tensor>], inputs: &[Tensor]) -> Result<Work> {
        self.submit(Collective::AllGather {
            outputs: outputs.to_vec(),
            inputs: inputs.to_vec(),
        })
    }

    pub fn gather(&self, outputs: &[Vec<Tensor>], inputs: &[Tensor], root: Rank) -> Result<Work> {
        self.submit(Collective::Gather {
            outputs: outputs.to_vec(),
            inputs: inputs.to_vec(),
            root,
        })
    }

    pub fn scatter(&self, outputs: &[Tensor], inputs: &[Vec<Tensor>], root: Rank) -> Result<Work> {
        self.submit(Collective::Scatter {
            outputs: outputs.to_vec(),
            inputs: inputs.to_vec(),
            root,
        })
    }

    pub fn all_to_all_base(
        &self,
        output: &Tensor,
        input: &Tensor,
        output_split_sizes: &[usize],
        input_split_sizes: &[usize],
    ) -> Result<Work> {
        self.submit(Collective::AllToAllBase {
            output: output.clone(),
            input: input.clone(),
            output_split_sizes: output_split_sizes.to_vec(),
            input_split_sizes: input_split_sizes.to_vec(),
        })
    }

    pub fn all_to_all(&self, outputs: &[Tensor], inputs: &[Tensor]) -> Result<Work> {
        self.submit(Collective::AllToAll {
            outputs: outputs.to_vec(),
            inputs: inputs.to_vec(),
        })
    }

    pub fn barrier(&self) -> Result<Work> {
        self.submit(Collective::Barrier)
    }

    pub fn all_reduce_coalesced(&self, _tensors: &[Tensor], _op: ReduceOp) -> Result<Work> {
        collective::unsupported("allreduce_coalesced")
    }

    pub fn all_gather_coalesced(
        &self,
        _outputs: &[Vec<Tensor>],
        _inputs: &[Tensor],
    ) -> Result<Work> {
        collective::unsupported("allgather_coalesced")
    }

    pub fn all_gather_base(&self, _output: &Tensor, _input: &Tensor) -> Result<Work> {
        collective::unsupported("allgather_base")
    }

    pub fn reduce_scatter(
        &self,
        _outputs: &[Tensor],
        _inputs: &[Vec<Tensor>],
        _op: ReduceOp,
    ) -> Result<Work> {
        collective::unsupported("reduce_scatter")
    }

    pub fn send(&self, _tensors: &[Tensor], _dst: Rank, _tag: i32) -> Result<Work> {
        collective::unsupported("send")
    }

    pub fn recv(&self, _tensors: &[Tensor], _src: Rank, _tag: i32) -> Result<Work> {
        collective::unsupported("recv")
    }

    pub fn recv_anysource(&self, _tensors: &[Tensor], _tag: i32) -> Result<Work> {
        collective::unsupported("recv_anysource")
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        // SAFETY: `comm` is taken exactly once, here, and never used again.
        let comm = unsafe { ManuallyDrop::take(&mut self.comm) };
        let released = engine_call!(self.runtime.lock(), {
            drop(comm);
            Ok(())
        });
        match released {
            Ok(()) => tracing::info!(rank = self.rank, "process group destroyed"),
            Err(e) => tracing::warn!(rank = self.rank, error = %e, "communicator release failed"),
        }
    }
}

impl std::fmt::Debug for ProcessGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessGroup")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .field("timeout", &self.timeout)
            .finish()
    }
}
