pub mod collective;
pub mod config;
pub mod engine;
pub mod error;
pub mod group;
pub mod layout;
pub mod runtime;
pub mod staging;
pub mod store;
pub mod tensor;
pub mod types;

pub use collective::{Collective, OpType, Work, WorkGroup};
pub use config::ProcessGroupOptions;
pub use engine::{LocalEnvironment, LocalFabric};
pub use error::{CclError, Result};
pub use group::ProcessGroup;
pub use runtime::EngineRuntime;
pub use store::{HashStore, Store};
pub use tensor::{Bf16, Element, Tensor};
pub use types::{DataType, Device, Rank, ReduceOp};

/// Whether these tensors can take part in one call: every tensor is
/// contiguous and no two live on the same device.
pub fn is_available(tensors: &[Tensor]) -> bool {
    let mut seen = std::collections::HashSet::new();
    tensors
        .iter()
        .all(|t| t.is_contiguous() && seen.insert(t.device()))
}
