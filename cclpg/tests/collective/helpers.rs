use cclpg::{EngineRuntime, LocalFabric, ProcessGroup, ProcessGroupOptions};
use std::process::{Command, Output};
use std::sync::Arc;

/// Helper: run `f` on every rank of an in-process job, one thread per rank.
/// Each rank gets its own engine runtime and process group over one shared
/// fabric. Groups are dropped on their own thread once `f` returns.
pub fn run_ranks<F>(world_size: usize, f: F)
where
    F: Fn(&ProcessGroup) + Send + Sync,
{
    let fabric = LocalFabric::new(world_size);
    std::thread::scope(|s| {
        let handles: Vec<_> = (0..world_size)
            .map(|rank| {
                let fabric = &fabric;
                let f = &f;
                s.spawn(move || {
                    let pg = group(fabric, rank);
                    f(&pg);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
    });
}

/// Build rank `rank`'s process group on `fabric`.
pub fn group(fabric: &Arc<LocalFabric>, rank: usize) -> ProcessGroup {
    let env = fabric.environment(rank).unwrap();
    let runtime = EngineRuntime::new(Arc::new(env));
    let opts = ProcessGroupOptions::new()
        .with_rank(rank)
        .with_size(fabric.world_size());
    ProcessGroup::new(runtime, opts, None).unwrap()
}

/// Re-run this test binary for the single test `test`, with `var` set so the
/// test takes its child branch. Used for behavior that only shows at process
/// exit.
pub fn rerun_as_child(test: &str, var: &str) -> Output {
    let exe = std::env::current_exe().unwrap();
    Command::new(exe)
        .args([test, "--exact", "--nocapture", "--test-threads=1"])
        .env(var, "1")
        .output()
        .unwrap()
}
