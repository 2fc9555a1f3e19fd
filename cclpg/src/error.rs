use crate::types::{DataType, Rank, ReduceOp};

pub type Result<T> = std::result::Result<T, CclError>;

#[derive(Debug, thiserror::Error)]
pub enum CclError {
    #[error("{operation}: {reason}")]
    InvalidArgument {
        operation: &'static str,
        reason: String,
    },

    #[error("invalid rank {rank}: world size is {world_size}")]
    InvalidRank { rank: Rank, world_size: usize },

    #[error("unsupported data type: {dtype} for operation {operation}")]
    UnsupportedDType {
        dtype: DataType,
        operation: &'static str,
    },

    #[error("unsupported reduction op: {op} for operation {operation}")]
    UnsupportedReduceOp {
        op: ReduceOp,
        operation: &'static str,
    },

    #[error("process group does not support {operation}")]
    UnsupportedOperation { operation: &'static str },

    #[error("{operation} not implemented")]
    NotImplemented { operation: &'static str },

    /// Any failure raised by the engine, re-signaled at the call site.
    #[error("{message}")]
    Engine {
        message: String,
        file: &'static str,
        line: u32,
    },

    #[error("invalid call to {operation} before work has completed")]
    WorkNotCompleted { operation: &'static str },

    #[error("unexpected rank {requested}, engine rank {engine}")]
    RankMismatch { requested: usize, engine: usize },

    #[error("unexpected size {requested}, engine size {engine}")]
    SizeMismatch { requested: usize, engine: usize },

    #[error("engine runtime error: {reason}")]
    Runtime { reason: String },

    #[error("internal lock poisoned: {0}")]
    LockPoisoned(&'static str),
}

impl CclError {
    /// Create an `InvalidArgument` error.
    pub fn invalid(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            operation,
            reason: reason.into(),
        }
    }

    /// Create a `Runtime` error.
    pub fn runtime(reason: impl Into<String>) -> Self {
        Self::Runtime {
            reason: reason.into(),
        }
    }

    /// True for errors raised by the engine rather than by argument checks.
    pub fn is_engine(&self) -> bool {
        matches!(self, Self::Engine { .. })
    }
}
