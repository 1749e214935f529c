use std::path::PathBuf;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;

use engine_logging::{engine_info, engine_warn};
use prospector_core::{Marketplace, TaskId};

use crate::session::{force_close_all, lock_shared, SharedRun};
use crate::{
    ChannelProgressSink, CommandAck, EngineEvent, ListingExtractor, Orchestrator,
    OrchestratorSettings, RetryController, RetrySettings, SessionManager, StagingStore,
    WorkerContext,
};

/// Tunables for a collection run. Defaults match the production pipeline;
/// tests shrink the delays.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub batch_size: usize,
    pub max_retries: u32,
    pub ready_timeout: std::time::Duration,
    pub stagger: std::time::Duration,
    pub batch_delay: std::time::Duration,
    pub backoff_base: std::time::Duration,
    pub completeness_threshold: f32,
    /// Directory for the staged-run file; `None` disables staging.
    pub staging_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let retry = RetrySettings::default();
        let orchestration = OrchestratorSettings::default();
        Self {
            batch_size: orchestration.batch_size,
            max_retries: retry.max_retries,
            ready_timeout: retry.ready_timeout,
            stagger: orchestration.stagger,
            batch_delay: orchestration.batch_delay,
            backoff_base: retry.backoff_base,
            completeness_threshold: retry.completeness_threshold,
            staging_dir: None,
        }
    }
}

enum EngineCommand {
    Run {
        items: Vec<TaskId>,
        marketplace: Marketplace,
        source_url: String,
        epoch: u64,
    },
}

/// Command dispatcher and run-state owner.
///
/// Owns a dedicated thread with a tokio runtime; `start` and `stop` are
/// synchronous, return immediately, and never wait for in-flight work.
#[derive(Clone)]
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    event_rx: Arc<Mutex<mpsc::Receiver<EngineEvent>>>,
    shared: Arc<Mutex<SharedRun>>,
}

impl EngineHandle {
    pub fn new(
        config: EngineConfig,
        context: Arc<dyn WorkerContext>,
        extractor: Arc<dyn ListingExtractor>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel::<EngineCommand>();
        let (event_tx, event_rx) = mpsc::channel::<EngineEvent>();
        let shared = Arc::new(Mutex::new(SharedRun::default()));

        let sessions = SessionManager::new(context, shared.clone());
        let retry = RetryController::new(
            sessions,
            extractor,
            RetrySettings {
                max_retries: config.max_retries,
                ready_timeout: config.ready_timeout,
                backoff_base: config.backoff_base,
                completeness_threshold: config.completeness_threshold,
            },
        );
        let staging = config.staging_dir.clone().map(StagingStore::new);
        let orchestrator = Arc::new(Orchestrator::new(
            retry,
            Arc::new(ChannelProgressSink::new(event_tx)),
            shared.clone(),
            staging,
            OrchestratorSettings {
                batch_size: config.batch_size,
                stagger: config.stagger,
                batch_delay: config.batch_delay,
            },
        ));

        thread::spawn(move || {
            let runtime = match tokio::runtime::Runtime::new() {
                Ok(runtime) => runtime,
                Err(err) => {
                    engine_warn!("engine runtime failed to start: {err}");
                    return;
                }
            };
            while let Ok(command) = cmd_rx.recv() {
                let orchestrator = orchestrator.clone();
                match command {
                    EngineCommand::Run {
                        items,
                        marketplace,
                        source_url,
                        epoch,
                    } => {
                        runtime.spawn(async move {
                            orchestrator
                                .run(items, marketplace, &source_url, epoch)
                                .await;
                        });
                    }
                }
            }
        });

        Self {
            cmd_tx,
            event_rx: Arc::new(Mutex::new(event_rx)),
            shared,
        }
    }

    /// Accepts or rejects a run synchronously; the pipeline itself is
    /// launched in the background.
    pub fn start(&self, source_url: &str, items: Vec<TaskId>) -> CommandAck {
        let marketplace = match Marketplace::from_url(source_url) {
            Ok(marketplace) => marketplace,
            Err(err) => return CommandAck::rejected(err.to_string()),
        };

        let epoch = {
            let mut shared = lock_shared(&self.shared);
            if shared.run_state.begin().is_err() {
                return CommandAck::rejected("a collection run is already in progress");
            }
            shared.epoch += 1;
            shared.epoch
        };

        let item_count = items.len();
        let command = EngineCommand::Run {
            items,
            marketplace,
            source_url: source_url.to_string(),
            epoch,
        };
        if self.cmd_tx.send(command).is_err() {
            lock_shared(&self.shared).run_state.finish();
            return CommandAck::rejected("engine is shut down");
        }
        engine_info!("accepted run of {item_count} items on {marketplace}");
        CommandAck::accepted(format!(
            "collection started: {item_count} items on {marketplace}"
        ))
    }

    /// Requests cancellation and force-closes open sessions. Returns
    /// immediately; the in-flight batch drains in the background and the
    /// subscriber still receives its results plus the completion event.
    pub fn stop(&self) -> CommandAck {
        {
            let mut shared = lock_shared(&self.shared);
            if !shared.run_state.in_progress() {
                return CommandAck::rejected("no collection run in progress");
            }
            shared.run_state.request_stop();
        }
        force_close_all(&self.shared);
        let mut shared = lock_shared(&self.shared);
        shared.run_state.finish();
        CommandAck::accepted("stopping; in-flight tasks will resolve shortly")
    }

    /// Drains the next engine event, if any.
    pub fn try_recv(&self) -> Option<EngineEvent> {
        match self.event_rx.lock() {
            Ok(rx) => rx.try_recv().ok(),
            Err(_) => None,
        }
    }
}
