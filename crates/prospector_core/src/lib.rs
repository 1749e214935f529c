//! Prospector core: pure planning and run-state logic, no IO.
mod backoff;
mod marketplace;
mod plan;
mod record;
mod run_state;
mod task;

pub use backoff::backoff_delay;
pub use marketplace::{Marketplace, UnsupportedSource};
pub use plan::plan_batches;
pub use record::{
    is_complete, missing_key_field_fraction, FailureKind, ListingRecord, TaskFailure, TaskResult,
    DEFAULT_COMPLETENESS_THRESHOLD, KEY_FIELD_COUNT,
};
pub use run_state::{AlreadyInProgress, RunState, SessionId};
pub use task::{Task, TaskId};
