use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_debug, engine_warn};
use prospector_core::{backoff_delay, is_complete, FailureKind, Task, TaskFailure, TaskResult};

use crate::session::lock_shared;
use crate::{ListingExtractor, SessionManager};

#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Retries after the first attempt; a task gets `max_retries + 1` attempts.
    pub max_retries: u32,
    /// Readiness timeout applied to every attempt's session.
    pub ready_timeout: Duration,
    /// Base of the exponential backoff between attempts.
    pub backoff_base: Duration,
    /// Missing-key-field fraction at which a record triggers a retry.
    pub completeness_threshold: f32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 2,
            ready_timeout: Duration::from_secs(15),
            backoff_base: Duration::from_secs(1),
            completeness_threshold: prospector_core::DEFAULT_COMPLETENESS_THRESHOLD,
        }
    }
}

/// Drives one task through bounded attempts, always via the session manager.
///
/// Guarantee: terminates within `max_retries + 1` attempts and yields exactly
/// one result. Failures become error-shaped results; an exhausted run of
/// incomplete attempts returns the last result as-is rather than dropping
/// the task.
#[derive(Clone)]
pub struct RetryController {
    sessions: SessionManager,
    extractor: Arc<dyn ListingExtractor>,
    settings: RetrySettings,
}

impl RetryController {
    pub fn new(
        sessions: SessionManager,
        extractor: Arc<dyn ListingExtractor>,
        settings: RetrySettings,
    ) -> Self {
        Self {
            sessions,
            extractor,
            settings,
        }
    }

    pub async fn process_task(&self, mut task: Task) -> TaskResult {
        let max_attempts = self.settings.max_retries.saturating_add(1);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if let Some(delay) = backoff_delay(attempt, self.settings.backoff_base) {
                engine_debug!(
                    "item {}: backing off {:?} before attempt {attempt}",
                    task.id,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            if self.stopping() {
                // A stop while this task sat in its stagger or backoff sleep:
                // the forced close only reaches sessions that were already
                // registered, so never open a fresh one now.
                return TaskResult::Failed(TaskFailure::new(
                    FailureKind::Cancelled,
                    "run stopped before attempt",
                ));
            }
            task.attempt = attempt;

            let result = self.attempt(&task).await;
            if matches!(
                &result,
                TaskResult::Failed(f) if f.kind == FailureKind::Cancelled
            ) {
                // Force-closed by stop; retrying would only delay the drain.
                return result;
            }
            let complete = is_complete(&result, self.settings.completeness_threshold);
            if complete || attempt >= max_attempts {
                if !complete {
                    engine_warn!(
                        "item {}: still incomplete after {attempt} attempts; returning as-is",
                        task.id
                    );
                }
                return result;
            }
            engine_debug!("item {}: attempt {attempt} incomplete, retrying", task.id);
        }
    }

    fn stopping(&self) -> bool {
        lock_shared(self.sessions.shared()).run_state.stop_requested()
    }

    /// One attempt: open, await readiness, extract, close. The session guard
    /// also closes on drop, so no exit path leaks a session.
    async fn attempt(&self, task: &Task) -> TaskResult {
        let mut session = match self.sessions.open(task).await {
            Ok(session) => session,
            Err(err) => return TaskResult::Failed(failure(&err)),
        };

        if let Err(err) = session.await_ready(self.settings.ready_timeout).await {
            session.close();
            return TaskResult::Failed(failure(&err));
        }

        let outcome = session.run(self.extractor.as_ref()).await;
        session.close();
        match outcome {
            Ok(record) => TaskResult::Record(record),
            Err(err) => TaskResult::Failed(failure(&err)),
        }
    }
}

fn failure(err: &crate::SessionError) -> TaskFailure {
    TaskFailure::new(err.failure_kind(), err.to_string())
}
