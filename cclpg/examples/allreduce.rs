//! Allreduce across 4 in-process ranks.
//!
//! Each rank starts with its own data. After allreduce(Sum), every rank holds
//! the element-wise sum of all inputs.
//!
//! ```bash
//! cargo run --example allreduce
//! ```

use cclpg::{EngineRuntime, LocalFabric, ProcessGroup, ProcessGroupOptions, ReduceOp, Tensor};
use futures::future::try_join_all;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let world_size = 4;
    let fabric = LocalFabric::new(world_size);

    let mut groups = Vec::new();
    for rank in 0..world_size {
        let env = fabric.environment(rank)?;
        let runtime = EngineRuntime::new(Arc::new(env));
        groups.push(ProcessGroup::new(runtime, ProcessGroupOptions::new(), None)?);
    }

    // rank 0: [0.0, 0.0, ...], rank 1: [1.0, 1.0, ...], etc.
    let count = 8;
    let tensors: Vec<Tensor> = (0..world_size)
        .map(|rank| Tensor::from_vec(vec![rank as f32; count]))
        .collect();

    let mut pending = Vec::new();
    for (pg, t) in groups.iter().zip(&tensors) {
        pending.push(
            pg.all_reduce(std::slice::from_ref(t), ReduceOp::Sum)?
                .into_future(),
        );
    }
    try_join_all(pending).await?;

    for (rank, t) in tensors.iter().enumerate() {
        println!("rank {rank}: {:?}", t.to_vec::<f32>()?);
    }
    // Output (all ranks identical):
    // rank 0: [6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0, 6.0]
    // ...

    Ok(())
}
