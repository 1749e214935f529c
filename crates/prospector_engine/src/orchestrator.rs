use std::sync::{Arc, Mutex};
use std::time::Duration;

use engine_logging::{engine_error, engine_info};
use prospector_core::{plan_batches, Marketplace, TaskId};
use tokio::task::JoinSet;

use crate::session::{lock_shared, SharedRun};
use crate::{EngineEvent, ProgressSink, RetryController, StagingStore};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub batch_size: usize,
    /// Start offset between the k-th and (k+1)-th task of a batch.
    pub stagger: Duration,
    /// Pause between consecutive batches.
    pub batch_delay: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            batch_size: 5,
            stagger: Duration::from_millis(200),
            batch_delay: Duration::from_secs(1),
        }
    }
}

/// Sequences batches: fans tasks out with a stagger, collects results in
/// completion order, applies the inter-batch delay and honors stop requests
/// at batch boundaries.
pub struct Orchestrator {
    retry: RetryController,
    sink: Arc<dyn ProgressSink>,
    shared: Arc<Mutex<SharedRun>>,
    staging: Option<StagingStore>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        retry: RetryController,
        sink: Arc<dyn ProgressSink>,
        shared: Arc<Mutex<SharedRun>>,
        staging: Option<StagingStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            retry,
            sink,
            shared,
            staging,
            settings,
        }
    }

    /// Runs one collection to completion or cancellation.
    ///
    /// `epoch` identifies the run; shared state is only finalized when it
    /// still belongs to this run, so a stop-then-restart is never clobbered.
    pub async fn run(
        &self,
        items: Vec<TaskId>,
        marketplace: Marketplace,
        source_url: &str,
        epoch: u64,
    ) {
        if let Some(staging) = &self.staging {
            staging.stage_best_effort(source_url, marketplace, &items);
        }

        let batch_size = self.settings.batch_size.max(1);
        let total_batches = items.len().div_ceil(batch_size);
        engine_info!(
            "run started: {} items on {marketplace} in {total_batches} batches of {batch_size}",
            items.len()
        );

        let mut batches = plan_batches(&items, marketplace, batch_size)
            .enumerate()
            .peekable();
        while let Some((index, batch)) = batches.next() {
            if self.interrupted(epoch) {
                engine_info!("stop requested; skipping batches {}..{total_batches}", index + 1);
                break;
            }

            engine_info!("batch {}/{total_batches}: {} tasks", index + 1, batch.len());
            let mut inflight = JoinSet::new();
            for (k, task) in batch.into_iter().enumerate() {
                let retry = self.retry.clone();
                let stagger = self.settings.stagger.saturating_mul(k as u32);
                inflight.spawn(async move {
                    if !stagger.is_zero() {
                        tokio::time::sleep(stagger).await;
                    }
                    let task_id = task.id.clone();
                    let result = retry.process_task(task).await;
                    (task_id, result)
                });
            }

            // One task's failure never fails the batch; results stream out
            // as they resolve, not when the batch closes.
            while let Some(joined) = inflight.join_next().await {
                match joined {
                    Ok((task_id, result)) => {
                        self.sink.emit(EngineEvent::TaskResolved { task_id, result });
                    }
                    Err(err) => engine_error!("collection task panicked: {err}"),
                }
            }

            if batches.peek().is_some() && !self.interrupted(epoch) {
                tokio::time::sleep(self.settings.batch_delay).await;
            }
        }

        if let Some(staging) = &self.staging {
            staging.clear_best_effort(source_url);
        }

        let stopped = {
            let mut shared = lock_shared(&self.shared);
            let stopped = shared.epoch != epoch || shared.run_state.stop_requested();
            if shared.epoch == epoch {
                shared.run_state.finish();
            }
            stopped
        };
        engine_info!("run completed (stopped={stopped})");
        self.sink.emit(EngineEvent::RunCompleted { stopped });
    }

    fn interrupted(&self, epoch: u64) -> bool {
        let shared = lock_shared(&self.shared);
        shared.epoch != epoch || shared.run_state.stop_requested()
    }
}
