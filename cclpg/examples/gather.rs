//! Gather into separately allocated buffers on the root.
//!
//! The root's outputs do not share storage, so the call stages the received
//! data and copies it back before returning a completed handle.
//!
//! ```bash
//! cargo run --example gather
//! ```

use cclpg::{DataType, EngineRuntime, LocalFabric, ProcessGroup, ProcessGroupOptions, Tensor};
use std::sync::Arc;

fn main() {
    let world_size = 3;
    let root = 0;
    let fabric = LocalFabric::new(world_size);

    std::thread::scope(|s| {
        for rank in 0..world_size {
            let fabric = &fabric;
            s.spawn(move || {
                let env = fabric.environment(rank).unwrap();
                let runtime = EngineRuntime::new(Arc::new(env));
                let pg = ProcessGroup::new(runtime, ProcessGroupOptions::new(), None).unwrap();

                // rank r contributes r + 1 copies of r.
                let input = Tensor::from_vec(vec![rank as i64; rank + 1]);
                let outputs: Vec<Vec<Tensor>> = if rank == root {
                    vec![(0..world_size)
                        .map(|r| Tensor::zeros(&[r + 1], DataType::I64))
                        .collect()]
                } else {
                    Vec::new()
                };

                let mut work = pg
                    .gather(&outputs, std::slice::from_ref(&input), root)
                    .unwrap();
                work.wait().unwrap();
                for (r, out) in work.result().unwrap().iter().enumerate() {
                    println!("from rank {r}: {:?}", out.to_vec::<i64>().unwrap());
                }
            });
        }
    });
    // Output:
    // from rank 0: [0]
    // from rank 1: [1, 1]
    // from rank 2: [2, 2, 2]
}
