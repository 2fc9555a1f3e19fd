//! The collective engine seen as a black box.
//!
//! An engine exposes a request-based API: every collective call returns a
//! [`Request`] that can be tested without blocking or waited on. Tensors are
//! passed the way an engine sees data pointers: the engine reads or writes
//! `count` consecutive elements starting at the tensor's first element.
//!
//! Engine calls must go through [`SubmissionLock::call`] (or the crate's
//! `engine_call!` macro), which serializes them and turns any [`EngineError`]
//! or panic into [`CclError::Engine`](crate::CclError::Engine).

mod local;
mod lock;
mod reduce;
mod types;

use std::sync::Arc;

use crate::tensor::Tensor;
use crate::types::Rank;

pub use local::{LocalEnvironment, LocalFabric};
pub(crate) use lock::engine_call;
pub use lock::{CallSite, SubmissionLock};
pub use types::{EngineDatatype, EngineReduction, to_engine_dtype, to_engine_op};

/// Failure raised inside an engine. Never crosses the process-group boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EngineError {
    message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<crate::error::CclError> for EngineError {
    fn from(e: crate::error::CclError) -> Self {
        Self::new(e.to_string())
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// One in-flight collective.
pub trait Request: Send {
    /// Non-blocking completion check.
    fn test(&mut self) -> EngineResult<bool>;

    /// Block until the collective finishes.
    fn wait(&mut self) -> EngineResult<()>;
}

/// Receive side of a variable-length all-gather.
#[derive(Debug, Clone, Copy)]
pub enum RecvBuffer<'a> {
    /// One contiguous buffer holding every rank's segment back to back.
    Contiguous(&'a Tensor),
    /// One buffer per rank.
    Vector(&'a [Tensor]),
}

/// A group of ranks able to run collectives together.
pub trait Communicator: Send + Sync {
    fn rank(&self) -> Rank;

    fn size(&self) -> usize;

    fn bcast(
        &self,
        buf: &Tensor,
        count: usize,
        dtype: EngineDatatype,
        root: Rank,
    ) -> EngineResult<Box<dyn Request>>;

    fn allreduce(
        &self,
        send: &Tensor,
        recv: &Tensor,
        count: usize,
        dtype: EngineDatatype,
        op: EngineReduction,
    ) -> EngineResult<Box<dyn Request>>;

    /// The result is written to `recv` on `root` only.
    fn reduce(
        &self,
        send: &Tensor,
        recv: &Tensor,
        count: usize,
        dtype: EngineDatatype,
        op: EngineReduction,
        root: Rank,
    ) -> EngineResult<Box<dyn Request>>;

    fn allgatherv(
        &self,
        send: &Tensor,
        send_count: usize,
        recv: RecvBuffer<'_>,
        recv_counts: &[usize],
        dtype: EngineDatatype,
    ) -> EngineResult<Box<dyn Request>>;

    /// Fixed-size all-to-all: `count` elements to and from every rank.
    fn alltoall(
        &self,
        send: &Tensor,
        recv: &Tensor,
        count: usize,
        dtype: EngineDatatype,
    ) -> EngineResult<Box<dyn Request>>;

    /// Variable-length all-to-all. `send_counts[r]` elements go to rank `r`;
    /// `recv_counts[r]` elements arrive from rank `r`, packed in rank order.
    fn alltoallv(
        &self,
        send: &Tensor,
        send_counts: &[usize],
        recv: &Tensor,
        recv_counts: &[usize],
        dtype: EngineDatatype,
    ) -> EngineResult<Box<dyn Request>>;

    /// Blocks until every rank reaches the barrier.
    fn barrier(&self) -> EngineResult<()>;
}

/// Process-wide engine entry point: creates communicators.
pub trait Environment: Send + Sync {
    fn create_communicator(&self) -> EngineResult<Arc<dyn Communicator>>;
}
