use std::time::Duration;

use prospector_core::{FailureKind, TaskId, TaskResult};

/// Events streamed to the subscriber while a run is in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// One task resolved; emitted in completion order, exactly once per task.
    TaskResolved { task_id: TaskId, result: TaskResult },
    /// The run finished, normally or via `stop`. Emitted exactly once.
    RunCompleted { stopped: bool },
}

/// Synchronous response to a `start` or `stop` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAck {
    pub accepted: bool,
    pub message: String,
}

impl CommandAck {
    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            accepted: true,
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            message: message.into(),
        }
    }
}

/// Failures surfaced by a worker session; all of them resolve into a task
/// result inside the retry controller, none escape the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to create session: {0}")]
    Create(String),
    #[error("session not ready within {timeout:?}")]
    Timeout { timeout: Duration },
    #[error("extraction failed: {0}")]
    Extraction(String),
    #[error("session cancelled")]
    Cancelled,
}

impl SessionError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            SessionError::Create(_) => FailureKind::SessionCreate,
            SessionError::Timeout { .. } => FailureKind::SessionTimeout,
            SessionError::Extraction(_) => FailureKind::Extraction,
            SessionError::Cancelled => FailureKind::Cancelled,
        }
    }
}

/// A fully loaded, decoded detail page handed to the extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDocument {
    pub url: String,
    pub html: String,
    pub encoding_label: String,
}
