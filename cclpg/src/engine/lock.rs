use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;

use super::EngineResult;
use crate::error::{CclError, Result};

/// Source location of an engine call, reported when the call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    pub file: &'static str,
    pub line: u32,
}

/// The single lock serializing every call into the engine.
///
/// Covers engine initialization, collective submission, request polling and
/// waiting, and communicator creation and release. It is never held across
/// argument validation or layout analysis.
#[derive(Debug, Default)]
pub struct SubmissionLock {
    inner: Mutex<()>,
}

impl SubmissionLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one engine call while holding the lock.
    pub fn call<T>(&self, site: CallSite, f: impl FnOnce() -> EngineResult<T>) -> Result<T> {
        let _guard = self
            .inner
            .lock()
            .map_err(|_| CclError::LockPoisoned("engine submission"))?;
        boundary(site, f)
    }
}

/// Re-signal engine failures, including panics, as `CclError::Engine`.
pub(crate) fn boundary<T>(site: CallSite, f: impl FnOnce() -> EngineResult<T>) -> Result<T> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(CclError::Engine {
            message: format!(
                "CCL error in: {}:{}, with error message: {e}",
                site.file, site.line
            ),
            file: site.file,
            line: site.line,
        }),
        Err(_) => Err(CclError::Engine {
            message: format!("unknown error in: {}:{}", site.file, site.line),
            file: site.file,
            line: site.line,
        }),
    }
}

/// `engine_call!(lock, expr)` runs `expr` under the submission lock and tags
/// failures with the caller's file and line.
macro_rules! engine_call {
    ($lock:expr, $call:expr) => {
        $lock.call(
            $crate::engine::CallSite {
                file: file!(),
                line: line!(),
            },
            || $call,
        )
    };
}

pub(crate) use engine_call;
