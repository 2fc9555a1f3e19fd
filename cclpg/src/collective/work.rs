use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;

use crate::collective::OpType;
use crate::engine::{Request, SubmissionLock, engine_call};
use crate::error::{CclError, Result};
use crate::tensor::Tensor;

enum WorkState {
    /// The engine may still read or write `buffers`.
    Pending {
        request: Box<dyn Request>,
        buffers: Vec<Tensor>,
    },
    Completed,
}

/// Handle to one collective.
///
/// A handle starts `Pending` when it wraps an in-flight engine request, or
/// `Completed` when the collective already finished during submission
/// (barrier, or a rooted/all-to-all collective that had to stitch its output).
/// It keeps every buffer the engine touches alive until completion.
///
/// Dropping a pending handle terminates the process: the engine could still
/// write into memory the caller believes is free. Call [`Work::wait`] first,
/// or opt out with the unsafe [`Work::abandon`].
pub struct Work {
    state: WorkState,
    lock: Arc<SubmissionLock>,
    op_type: OpType,
    debug_name: String,
    outputs: Vec<Tensor>,
}

impl Work {
    pub(crate) fn pending(
        lock: Arc<SubmissionLock>,
        op_type: OpType,
        debug_name: String,
        request: Box<dyn Request>,
        buffers: Vec<Tensor>,
        outputs: Vec<Tensor>,
    ) -> Self {
        Self {
            state: WorkState::Pending { request, buffers },
            lock,
            op_type,
            debug_name,
            outputs,
        }
    }

    pub(crate) fn completed(
        lock: Arc<SubmissionLock>,
        op_type: OpType,
        debug_name: String,
        outputs: Vec<Tensor>,
    ) -> Self {
        Self {
            state: WorkState::Completed,
            lock,
            op_type,
            debug_name,
            outputs,
        }
    }

    pub fn op_type(&self) -> OpType {
        self.op_type
    }

    /// `"<op>::sz:<elements>"`.
    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    /// Non-blocking completion check. Safe to call repeatedly.
    ///
    /// An engine failure releases the request and is returned as the error.
    pub fn poll(&mut self) -> Result<bool> {
        let WorkState::Pending { request, .. } = &mut self.state else {
            return Ok(true);
        };
        match engine_call!(self.lock, request.test()) {
            Ok(true) => {
                self.state = WorkState::Completed;
                tracing::trace!(work = %self.debug_name, "work completed on poll");
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(e) => {
                self.state = WorkState::Completed;
                Err(e)
            }
        }
    }

    pub fn is_completed(&mut self) -> Result<bool> {
        self.poll()
    }

    /// Block until the collective finishes.
    ///
    /// Always `Ok(true)` on return: there is no abort, so no failed
    /// completion to report. Engine failures come back as `Err`.
    pub fn wait(&mut self) -> Result<bool> {
        let WorkState::Pending { request, .. } = &mut self.state else {
            return Ok(true);
        };
        let outcome = engine_call!(self.lock, request.wait());
        self.state = WorkState::Completed;
        outcome?;
        tracing::trace!(work = %self.debug_name, "work completed on wait");
        Ok(true)
    }

    /// Only valid once completed, and then always `true`.
    pub fn is_success(&self) -> Result<bool> {
        match self.state {
            WorkState::Pending { .. } => Err(CclError::WorkNotCompleted {
                operation: "is_success",
            }),
            WorkState::Completed => Ok(true),
        }
    }

    /// Buffers holding this rank's result. Only valid once completed.
    pub fn result(&self) -> Result<&[Tensor]> {
        match self.state {
            WorkState::Pending { .. } => Err(CclError::WorkNotCompleted {
                operation: "result",
            }),
            WorkState::Completed => Ok(&self.outputs),
        }
    }

    /// In-flight collectives cannot be cancelled.
    pub fn abort(&mut self) -> Result<()> {
        Err(CclError::NotImplemented {
            operation: "Work::abort",
        })
    }

    /// Give up on a pending handle without terminating the process. The
    /// request and every buffer it references are leaked.
    ///
    /// # Safety
    /// The engine may keep writing into the leaked buffers. The caller must
    /// not read or reuse any storage shared with this collective's buffers
    /// while that can happen.
    pub unsafe fn abandon(self) {
        tracing::warn!(work = %self.debug_name, "abandoning work handle");
        std::mem::forget(self);
    }
}

impl Drop for Work {
    fn drop(&mut self) {
        if let WorkState::Pending { .. } = self.state {
            tracing::error!(
                work = %self.debug_name,
                "attempted destruction of Work before work has completed, terminating the program"
            );
            std::process::abort();
        }
    }
}

impl std::fmt::Debug for Work {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Work")
            .field("op_type", &self.op_type)
            .field("debug_name", &self.debug_name)
            .field("completed", &matches!(self.state, WorkState::Completed))
            .finish()
    }
}

/// Awaiting a `Work` waits on tokio's blocking pool and yields the result
/// buffers, so collectives chain into async code.
impl IntoFuture for Work {
    type Output = Result<Vec<Tensor>>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send>>;

    fn into_future(mut self) -> Self::IntoFuture {
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                self.wait()?;
                Ok(std::mem::take(&mut self.outputs))
            })
            .await
            .map_err(|e| CclError::runtime(format!("work wait task failed: {e}")))?
        })
    }
}

/// A set of handles waited on together.
#[derive(Debug, Default)]
pub struct WorkGroup {
    works: Vec<Work>,
}

impl WorkGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, work: Work) {
        self.works.push(work);
    }

    pub fn len(&self) -> usize {
        self.works.len()
    }

    pub fn is_empty(&self) -> bool {
        self.works.is_empty()
    }

    /// Wait for every handle, in submission order.
    ///
    /// Returns the first error encountered. Every handle is waited regardless.
    pub fn wait_all(self) -> Result<()> {
        let mut first_err = None;
        for mut w in self.works {
            if let Err(e) = w.wait()
                && first_err.is_none()
            {
                first_err = Some(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
