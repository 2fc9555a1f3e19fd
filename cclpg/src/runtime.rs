//! Process-wide engine state: the environment, its default communicator, and
//! the submission lock every engine call goes through.

use std::ffi::c_int;
use std::sync::{Arc, Mutex, Once, OnceLock};

use crate::engine::{Communicator, Environment, SubmissionLock, engine_call};
use crate::error::{CclError, Result};

enum RuntimeState {
    Uninit,
    Ready(Arc<dyn Communicator>),
    Finalized,
}

/// Shared engine handle. One per process in production; tests build one per
/// simulated rank.
pub struct EngineRuntime {
    environment: Arc<dyn Environment>,
    lock: Arc<SubmissionLock>,
    state: Mutex<RuntimeState>,
}

static GLOBAL: OnceLock<Arc<EngineRuntime>> = OnceLock::new();
static EXIT_HOOK: Once = Once::new();

unsafe extern "C" {
    fn atexit(callback: extern "C" fn()) -> c_int;
}

/// Tears down the process-wide runtime when the process exits. `GLOBAL` is
/// never dropped, so this is the only teardown path it gets.
extern "C" fn finalize_global_at_exit() {
    if let Some(runtime) = GLOBAL.get()
        && let Err(e) = runtime.finalize()
    {
        tracing::warn!(error = %e, "engine runtime teardown at exit failed");
    }
}

fn register_exit_hook() {
    EXIT_HOOK.call_once(|| {
        // SAFETY: the callback is a plain function with no captured state.
        if unsafe { atexit(finalize_global_at_exit) } != 0 {
            tracing::warn!("could not register engine teardown at exit");
        }
    });
}

impl EngineRuntime {
    /// A standalone runtime with its own submission lock.
    ///
    /// A process talking to a real engine should hold exactly one runtime,
    /// installed with [`EngineRuntime::install_global`] and reached through
    /// [`crate::ProcessGroup::from_global`]. Standalone runtimes exist to
    /// simulate several ranks inside one process.
    pub fn new(environment: Arc<dyn Environment>) -> Arc<Self> {
        Arc::new(Self {
            environment,
            lock: Arc::new(SubmissionLock::new()),
            state: Mutex::new(RuntimeState::Uninit),
        })
    }

    /// Install the process-wide runtime. Fails if one is already installed.
    ///
    /// Also registers a one-time exit hook that finalizes it.
    pub fn install_global(environment: Arc<dyn Environment>) -> Result<Arc<Self>> {
        let runtime = Self::new(environment);
        GLOBAL
            .set(Arc::clone(&runtime))
            .map_err(|_| CclError::runtime("global engine runtime already installed"))?;
        register_exit_hook();
        Ok(runtime)
    }

    /// The process-wide runtime installed by [`EngineRuntime::install_global`].
    pub fn global() -> Result<Arc<Self>> {
        GLOBAL
            .get()
            .cloned()
            .ok_or_else(|| CclError::runtime("no global engine runtime installed"))
    }

    pub fn lock(&self) -> &Arc<SubmissionLock> {
        &self.lock
    }

    pub fn environment(&self) -> &Arc<dyn Environment> {
        &self.environment
    }

    /// Initialize the engine if needed and return the default communicator.
    ///
    /// Runs the engine initialization at most once no matter how many callers
    /// race here. Fails after [`EngineRuntime::finalize`].
    pub fn init_once(&self) -> Result<Arc<dyn Communicator>> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| CclError::LockPoisoned("engine runtime"))?;
        match &*state {
            RuntimeState::Ready(comm) => Ok(Arc::clone(comm)),
            RuntimeState::Finalized => Err(CclError::runtime("engine runtime already finalized")),
            RuntimeState::Uninit => {
                let comm = engine_call!(self.lock, self.environment.create_communicator())?;
                tracing::info!(
                    rank = comm.rank(),
                    size = comm.size(),
                    "engine runtime initialized"
                );
                *state = RuntimeState::Ready(Arc::clone(&comm));
                Ok(comm)
            }
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(
            self.state.lock().as_deref(),
            Ok(RuntimeState::Ready(_))
        )
    }

    /// Release the default communicator. Idempotent.
    pub fn finalize(&self) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| CclError::LockPoisoned("engine runtime"))?;
        let previous = std::mem::replace(&mut *state, RuntimeState::Finalized);
        if let RuntimeState::Ready(comm) = previous {
            engine_call!(self.lock, {
                drop(comm);
                Ok(())
            })?;
            tracing::info!("engine runtime finalized");
        }
        Ok(())
    }
}

impl Drop for EngineRuntime {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            tracing::warn!(error = %e, "engine runtime teardown failed");
        }
    }
}
