use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use prospector_core::{
    FailureKind, ListingRecord, Marketplace, Task, TaskResult,
};
use prospector_engine::{
    ExtractionFault, ListingExtractor, PageDocument, RetryController, RetrySettings,
    SessionError, SessionManager, SharedRun, WorkerContext, WorkerSession,
};
use tokio_util::sync::CancellationToken;

/// What one opened session should do when driven.
#[derive(Debug, Clone)]
enum AttemptPlan {
    FailOpen,
    NeverReady,
    ExtractError,
    Yield(ListingRecord),
}

struct ScriptedContext {
    script: Mutex<VecDeque<AttemptPlan>>,
    opens: AtomicUsize,
    closes: Arc<AtomicUsize>,
}

impl ScriptedContext {
    fn new(plans: Vec<AttemptPlan>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(plans.into()),
            opens: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
        })
    }

    fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkerContext for ScriptedContext {
    async fn open(&self, _task: &Task) -> Result<Box<dyn WorkerSession>, SessionError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let plan = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(AttemptPlan::NeverReady);
        if matches!(plan, AttemptPlan::FailOpen) {
            return Err(SessionError::Create("scripted open failure".into()));
        }
        Ok(Box::new(ScriptedSession {
            plan,
            closes: self.closes.clone(),
        }))
    }
}

struct ScriptedSession {
    plan: AttemptPlan,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl WorkerSession for ScriptedSession {
    async fn await_ready(&mut self) -> Result<(), SessionError> {
        match self.plan {
            AttemptPlan::NeverReady => std::future::pending().await,
            _ => Ok(()),
        }
    }

    async fn run(
        &mut self,
        _extractor: &dyn ListingExtractor,
        _cancel: &CancellationToken,
    ) -> Result<ListingRecord, SessionError> {
        match &self.plan {
            AttemptPlan::ExtractError => {
                Err(SessionError::Extraction("scripted extraction error".into()))
            }
            AttemptPlan::Yield(record) => Ok(record.clone()),
            _ => Err(SessionError::Extraction("unexpected run".into())),
        }
    }

    fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// The scripted sessions never consult the extractor; any impl will do.
struct NoopExtractor;

impl ListingExtractor for NoopExtractor {
    fn extract(
        &self,
        _document: &PageDocument,
        _cancel: &CancellationToken,
    ) -> Result<ListingRecord, ExtractionFault> {
        Ok(ListingRecord::default())
    }
}

fn controller(context: Arc<ScriptedContext>) -> (RetryController, Arc<Mutex<SharedRun>>) {
    let shared = Arc::new(Mutex::new(SharedRun::default()));
    let manager = SessionManager::new(context, shared.clone());
    let controller = RetryController::new(manager, Arc::new(NoopExtractor), RetrySettings::default());
    (controller, shared)
}

fn task() -> Task {
    Task::new("B000TEST", Marketplace::Com)
}

fn partial(title: &str) -> ListingRecord {
    // Only the title set: 3 of 4 key fields missing, which is incomplete at
    // the default threshold.
    ListingRecord {
        title: Some(title.to_string()),
        ..ListingRecord::default()
    }
}

fn complete() -> ListingRecord {
    ListingRecord {
        title: Some("Stainless Travel Mug".to_string()),
        sales_rank: Some(1234),
        rating: Some(4.5),
        variant_count: Some(2),
        ..ListingRecord::default()
    }
}

#[tokio::test(start_paused = true)]
async fn always_incomplete_task_gets_exactly_three_attempts() {
    let context = ScriptedContext::new(vec![
        AttemptPlan::Yield(partial("attempt-1")),
        AttemptPlan::Yield(partial("attempt-2")),
        AttemptPlan::Yield(partial("attempt-3")),
    ]);
    let (controller, shared) = controller(context.clone());

    let result = controller.process_task(task()).await;

    // The final result is attempt 3's raw, still-incomplete output.
    assert_eq!(result, TaskResult::Record(partial("attempt-3")));
    assert_eq!(context.opens(), 3);
    assert_eq!(context.closes(), 3);
    assert_eq!(shared.lock().unwrap().run_state.active_session_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn backoff_precedes_attempts_two_and_three_only() {
    let context = ScriptedContext::new(vec![
        AttemptPlan::Yield(partial("a")),
        AttemptPlan::Yield(partial("b")),
        AttemptPlan::Yield(partial("c")),
    ]);
    let (controller, _shared) = controller(context);

    let started = tokio::time::Instant::now();
    controller.process_task(task()).await;

    // No delay before attempt 1, then 1s and 2s of backoff.
    assert_eq!(started.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn timeout_on_first_attempt_then_success_returns_second_result() {
    let context = ScriptedContext::new(vec![
        AttemptPlan::NeverReady,
        AttemptPlan::Yield(complete()),
    ]);
    let (controller, shared) = controller(context.clone());

    let result = controller.process_task(task()).await;

    assert_eq!(result, TaskResult::Record(complete()));
    // The timed-out session still got its close.
    assert_eq!(context.opens(), 2);
    assert_eq!(context.closes(), 2);
    assert_eq!(shared.lock().unwrap().run_state.active_session_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn exhausted_timeouts_yield_a_synthetic_timeout_result() {
    let context = ScriptedContext::new(vec![
        AttemptPlan::NeverReady,
        AttemptPlan::NeverReady,
        AttemptPlan::NeverReady,
    ]);
    let (controller, _shared) = controller(context.clone());

    let result = controller.process_task(task()).await;

    match result {
        TaskResult::Failed(failure) => assert_eq!(failure.kind, FailureKind::SessionTimeout),
        other => panic!("expected a timeout failure, got {other:?}"),
    }
    assert_eq!(context.opens(), 3);
    assert_eq!(context.closes(), 3);
}

#[tokio::test(start_paused = true)]
async fn open_failures_resolve_as_error_results() {
    let context = ScriptedContext::new(vec![
        AttemptPlan::FailOpen,
        AttemptPlan::FailOpen,
        AttemptPlan::FailOpen,
    ]);
    let (controller, shared) = controller(context.clone());

    let result = controller.process_task(task()).await;

    match result {
        TaskResult::Failed(failure) => assert_eq!(failure.kind, FailureKind::SessionCreate),
        other => panic!("expected a session-create failure, got {other:?}"),
    }
    // A failed open never creates a session, so there is nothing to close.
    assert_eq!(context.opens(), 3);
    assert_eq!(context.closes(), 0);
    assert_eq!(shared.lock().unwrap().run_state.active_session_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn extraction_errors_resolve_as_error_results_after_retries() {
    let context = ScriptedContext::new(vec![
        AttemptPlan::ExtractError,
        AttemptPlan::ExtractError,
        AttemptPlan::ExtractError,
    ]);
    let (controller, _shared) = controller(context.clone());

    let result = controller.process_task(task()).await;

    match result {
        TaskResult::Failed(failure) => assert_eq!(failure.kind, FailureKind::Extraction),
        other => panic!("expected an extraction failure, got {other:?}"),
    }
    assert_eq!(context.opens(), 3);
    assert_eq!(context.closes(), 3);
}

#[tokio::test(start_paused = true)]
async fn complete_first_attempt_needs_no_retry() {
    let context = ScriptedContext::new(vec![AttemptPlan::Yield(complete())]);
    let (controller, _shared) = controller(context.clone());

    let started = tokio::time::Instant::now();
    let result = controller.process_task(task()).await;

    assert_eq!(result, TaskResult::Record(complete()));
    assert_eq!(context.opens(), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}
