use std::collections::BTreeSet;
use std::fmt;

/// Engine-assigned identifier of one worker session.
pub type SessionId = u64;

/// Returned by [`RunState::begin`] when a run is already active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadyInProgress;

impl fmt::Display for AlreadyInProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a collection run is already in progress")
    }
}

impl std::error::Error for AlreadyInProgress {}

/// Shared state of the single active run.
///
/// The engine wraps one instance in a mutex; these transitions stay pure so
/// the invariants (single run, balanced register/deregister) are testable
/// without any concurrency.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunState {
    in_progress: bool,
    stop_requested: bool,
    active_sessions: BTreeSet<SessionId>,
    next_session_id: SessionId,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a run as started. Fails if one is already in progress.
    pub fn begin(&mut self) -> Result<(), AlreadyInProgress> {
        if self.in_progress {
            return Err(AlreadyInProgress);
        }
        self.in_progress = true;
        self.stop_requested = false;
        self.active_sessions.clear();
        Ok(())
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    /// Requests cooperative cancellation; the orchestrator honors it at the
    /// next batch boundary.
    pub fn request_stop(&mut self) {
        self.stop_requested = true;
    }

    /// Clears the in-progress flag after the pipeline finishes or is stopped.
    pub fn finish(&mut self) {
        self.in_progress = false;
        self.active_sessions.clear();
    }

    /// Allocates a session id and tracks it as open.
    pub fn register_session(&mut self) -> SessionId {
        self.next_session_id += 1;
        let id = self.next_session_id;
        self.active_sessions.insert(id);
        id
    }

    /// Removes a session from the active set.
    ///
    /// Idempotent: returns `true` only for the first removal, so a
    /// double-close never double-removes.
    pub fn deregister_session(&mut self, id: SessionId) -> bool {
        self.active_sessions.remove(&id)
    }

    pub fn active_sessions(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.active_sessions.iter().copied()
    }

    pub fn active_session_count(&self) -> usize {
        self.active_sessions.len()
    }
}
