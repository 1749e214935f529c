use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use engine_logging::{engine_debug, engine_warn};
use prospector_core::{ListingRecord, RunState, SessionId, Task};
use tokio_util::sync::CancellationToken;

use crate::{ListingExtractor, SessionError};

/// Ephemeral execution context factory: one opened session per task attempt.
///
/// The shipped implementation fetches the item's detail page over HTTP; a
/// headless-browser page or subprocess slots in behind the same trait.
#[async_trait]
pub trait WorkerContext: Send + Sync {
    async fn open(&self, task: &Task) -> Result<Box<dyn WorkerSession>, SessionError>;
}

/// One task attempt's execution context.
///
/// Lifecycle: opened -> loading -> ready -> extracting -> closed. `close`
/// is synchronous and idempotent so it can run on every exit path.
#[async_trait]
pub trait WorkerSession: Send {
    /// Resolves once the context has finished loading. The caller applies
    /// the readiness timeout; implementations just wait.
    async fn await_ready(&mut self) -> Result<(), SessionError>;

    /// Runs the extractor against the loaded context. The token is the
    /// explicit cancellation contract: a forced close cancels it and the
    /// extractor is expected to give up at its next checkpoint.
    async fn run(
        &mut self,
        extractor: &dyn ListingExtractor,
        cancel: &CancellationToken,
    ) -> Result<ListingRecord, SessionError>;

    /// Tears the context down. Called at most once by the managing guard.
    fn close(&mut self);
}

/// State shared between the dispatcher, the orchestrator and every session:
/// the run flags plus the cancellation token of each open session.
///
/// `epoch` increments on every accepted `start`; a pipeline only finalizes
/// state belonging to its own epoch, so a stop followed by a fresh start is
/// never clobbered by the draining previous run.
#[derive(Default)]
pub struct SharedRun {
    pub run_state: RunState,
    pub cancel_tokens: HashMap<SessionId, CancellationToken>,
    pub epoch: u64,
}

/// Opens sessions through the context and tracks them for forced teardown.
#[derive(Clone)]
pub struct SessionManager {
    context: Arc<dyn WorkerContext>,
    shared: Arc<Mutex<SharedRun>>,
}

impl SessionManager {
    pub fn new(context: Arc<dyn WorkerContext>, shared: Arc<Mutex<SharedRun>>) -> Self {
        Self { context, shared }
    }

    pub fn shared(&self) -> &Arc<Mutex<SharedRun>> {
        &self.shared
    }

    /// Opens a session for one task attempt and registers it for forced
    /// close. The returned guard deregisters on `close` and on drop.
    pub async fn open(&self, task: &Task) -> Result<ManagedSession, SessionError> {
        let inner = self.context.open(task).await?;
        let cancel = CancellationToken::new();
        let id = {
            let mut shared = lock_shared(&self.shared);
            let id = shared.run_state.register_session();
            shared.cancel_tokens.insert(id, cancel.clone());
            id
        };
        engine_debug!("session {id} opened for item {}", task.id);
        Ok(ManagedSession {
            id,
            inner,
            shared: self.shared.clone(),
            cancel,
            closed: false,
        })
    }
}

/// Cancels every tracked session token. Best effort: an attempt already past
/// its last await simply resolves normally.
pub(crate) fn force_close_all(shared: &Arc<Mutex<SharedRun>>) {
    let tokens: Vec<(SessionId, CancellationToken)> = {
        let mut shared = lock_shared(shared);
        shared.cancel_tokens.drain().collect()
    };
    for (id, token) in tokens {
        engine_debug!("force-closing session {id}");
        token.cancel();
    }
}

pub(crate) fn lock_shared(shared: &Arc<Mutex<SharedRun>>) -> std::sync::MutexGuard<'_, SharedRun> {
    // A poisoned lock means a panic elsewhere; the state itself is still
    // consistent for our transitions.
    match shared.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Scoped session handle: wraps the context's session with registry
/// bookkeeping, the readiness timeout and the forced-close race.
pub struct ManagedSession {
    id: SessionId,
    inner: Box<dyn WorkerSession>,
    shared: Arc<Mutex<SharedRun>>,
    cancel: CancellationToken,
    closed: bool,
}

impl ManagedSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Awaits context readiness, bounded by `timeout` and by forced close.
    pub async fn await_ready(&mut self, timeout: Duration) -> Result<(), SessionError> {
        let cancel = self.cancel.clone();
        tokio::select! {
            _ = cancel.cancelled() => Err(SessionError::Cancelled),
            ready = tokio::time::timeout(timeout, self.inner.await_ready()) => match ready {
                Err(_elapsed) => Err(SessionError::Timeout { timeout }),
                Ok(result) => result,
            },
        }
    }

    /// Runs the extractor inside the session, racing forced close.
    pub async fn run(
        &mut self,
        extractor: &dyn ListingExtractor,
    ) -> Result<ListingRecord, SessionError> {
        let cancel = self.cancel.clone();
        tokio::select! {
            _ = cancel.cancelled() => Err(SessionError::Cancelled),
            result = self.inner.run(extractor, &cancel) => result,
        }
    }

    /// Idempotent close: tears down the context and deregisters the session.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.inner.close();
        let mut shared = lock_shared(&self.shared);
        let removed = shared.run_state.deregister_session(self.id);
        shared.cancel_tokens.remove(&self.id);
        if removed {
            engine_debug!("session {} closed", self.id);
        }
    }
}

impl Drop for ManagedSession {
    fn drop(&mut self) {
        if !self.closed {
            engine_warn!("session {} dropped without close; closing now", self.id);
            self.close();
        }
    }
}
